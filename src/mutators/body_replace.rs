//! Policies that replace the whole body of a trust-decision method.
//!
//! The mutation is anchored on the first line marker of the method so that
//! every test executing the method counts as a candidate killer. Once the
//! replacement is emitted, the rest of the original body is dropped.

use crate::chain::{MethodInfo, MethodTransformer, MutatorFactory};
use crate::context::MutationContext;
use crate::insn::{Insn, Opcode};

/// `verify()` of a custom `HostnameVerifier` always returns true.
pub struct AlwaysTrueHostnameVerifier;

impl MutatorFactory for AlwaysTrueHostnameVerifier {
    fn name(&self) -> &'static str {
        "hostname_verifier_true"
    }

    fn excluded_prefix(&self) -> Option<&'static str> {
        Some("javax/net")
    }

    fn create(&self, method: &MethodInfo<'_>) -> Box<dyn MethodTransformer> {
        let eligible = method.name == "verify"
            && method.class.implements("javax/net/ssl/HostnameVerifier");
        Box::new(BodyReplace {
            policy: self.name(),
            description: "Changed result of HostnameVerifier to constant true",
            body: vec![Insn::simple(Opcode::Iconst1), Insn::simple(Opcode::Ireturn)],
            state: if eligible { BodyState::AwaitingLine } else { BodyState::Ineligible },
        })
    }
}

/// `checkServerTrusted()` of a custom `X509TrustManager` returns immediately.
pub struct EmptyTrustManager;

impl MutatorFactory for EmptyTrustManager {
    fn name(&self) -> &'static str {
        "empty_trust_manager"
    }

    fn excluded_prefix(&self) -> Option<&'static str> {
        Some("javax/net")
    }

    fn create(&self, method: &MethodInfo<'_>) -> Box<dyn MethodTransformer> {
        let eligible = method.name == "checkServerTrusted"
            && method.class.implements("javax/net/ssl/X509TrustManager");
        Box::new(BodyReplace {
            policy: self.name(),
            description: "Removed body of custom TrustManager",
            body: vec![Insn::simple(Opcode::Return)],
            state: if eligible { BodyState::AwaitingLine } else { BodyState::Ineligible },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Ineligible,
    AwaitingLine,
    /// Site registered but not selected; the original body passes through.
    Registered,
    /// Replacement emitted; everything that follows is discarded.
    Replaced,
}

struct BodyReplace {
    policy: &'static str,
    description: &'static str,
    body: Vec<Insn>,
    state: BodyState,
}

impl MethodTransformer for BodyReplace {
    fn visit(&mut self, insn: Insn, ctx: &mut MutationContext, out: &mut Vec<Insn>) {
        match self.state {
            BodyState::Replaced => {}
            BodyState::Ineligible | BodyState::Registered => out.push(insn),
            BodyState::AwaitingLine => {
                let Insn::LineNumber { line, .. } = insn else {
                    out.push(insn);
                    return;
                };
                ctx.register_current_line(line);
                let id = ctx.register_mutation(self.policy, self.description);
                out.push(insn);
                if ctx.should_mutate(&id) {
                    out.extend(self.body.iter().cloned());
                    self.state = BodyState::Replaced;
                } else {
                    self.state = BodyState::Registered;
                }
            }
        }
    }
}
