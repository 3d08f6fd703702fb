use crate::chain::{MethodInfo, MethodTransformer, MutatorFactory};
use crate::context::MutationContext;
use crate::insn::{Insn, Opcode};

const SSL_CONTEXT: &str = "javax/net/ssl/SSLContext";
const ONE_ARG: &str = "(Ljava/lang/String;)Ljavax/net/ssl/SSLContext;";
const WITH_PROVIDER_NAME: &str = "(Ljava/lang/String;Ljava/lang/String;)Ljavax/net/ssl/SSLContext;";
const WITH_PROVIDER: &str = "(Ljava/lang/String;Ljava/security/Provider;)Ljavax/net/ssl/SSLContext;";

/// Forces `SSLContext.getInstance()` to the broken `SSLv3` protocol.
pub struct VulnerableSslContextProtocol;

impl MutatorFactory for VulnerableSslContextProtocol {
    fn name(&self) -> &'static str {
        "ssl_context_protocol"
    }

    fn excluded_prefix(&self) -> Option<&'static str> {
        Some("javax/net")
    }

    fn create(&self, _method: &MethodInfo<'_>) -> Box<dyn MethodTransformer> {
        Box::new(SslProtocolVisitor)
    }
}

struct SslProtocolVisitor;

impl MethodTransformer for SslProtocolVisitor {
    fn visit(&mut self, insn: Insn, ctx: &mut MutationContext, out: &mut Vec<Insn>) {
        let Insn::Method { op: Opcode::Invokestatic, member, .. } = &insn else {
            out.push(insn);
            return;
        };
        if member.owner != SSL_CONTEXT || member.name != "getInstance" {
            out.push(insn);
            return;
        }

        let rewrite: Vec<Insn> = match member.descriptor.as_str() {
            // [.., protocol] -> [.., "SSLv3"]
            ONE_ARG => vec![Insn::simple(Opcode::Pop), Insn::ldc_str("SSLv3")],
            // [.., protocol, provider] -> [.., "SSLv3", provider]
            WITH_PROVIDER_NAME | WITH_PROVIDER => vec![
                Insn::simple(Opcode::Swap),
                Insn::simple(Opcode::Pop),
                Insn::ldc_str("SSLv3"),
                Insn::simple(Opcode::Swap),
            ],
            other => {
                log::warn!("Unknown variant of SSLContext.getInstance(): {}", other);
                out.push(insn);
                return;
            }
        };
        let description = if member.descriptor == ONE_ARG {
            "Changed parameter of SSLContext.getInstance() to 'SSLv3'"
        } else {
            "Changed first parameter of SSLContext.getInstance() to 'SSLv3'"
        };

        let id = ctx.register_mutation("ssl_context_protocol", description);
        if ctx.should_mutate(&id) {
            out.extend(rewrite);
        }
        out.push(insn);
    }
}
