use crate::chain::{MethodInfo, MethodTransformer, MutatorFactory};
use crate::context::MutationContext;
use crate::insn::{Constant, Insn};

/// Replaces a leading `https` scheme in string constants with `http`.
pub struct HttpsToHttp;

impl MutatorFactory for HttpsToHttp {
    fn name(&self) -> &'static str {
        "https_to_http"
    }

    fn create(&self, _method: &MethodInfo<'_>) -> Box<dyn MethodTransformer> {
        Box::new(HttpsToHttpVisitor)
    }
}

struct HttpsToHttpVisitor;

pub fn downgrade_scheme(s: &str) -> Option<String> {
    let head = s.get(..5)?;
    if !head.eq_ignore_ascii_case("https") {
        return None;
    }
    Some(format!("http{}", &s[5..]))
}

impl MethodTransformer for HttpsToHttpVisitor {
    fn visit(&mut self, insn: Insn, ctx: &mut MutationContext, out: &mut Vec<Insn>) {
        let modified = match &insn {
            Insn::Ldc { value: Constant::String(s) } => downgrade_scheme(s),
            _ => None,
        };
        let Some(modified) = modified else {
            out.push(insn);
            return;
        };

        let id = ctx.register_mutation("https_to_http", "Changed 'https' to 'http' in String");
        if ctx.should_mutate(&id) {
            out.push(Insn::ldc(Constant::String(modified)));
        } else {
            out.push(insn);
        }
    }
}
