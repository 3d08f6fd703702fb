use std::collections::HashMap;

use crate::chain::{MethodInfo, MethodTransformer, MutatorFactory};
use crate::context::MutationContext;
use crate::insn::{Insn, Opcode};

const JSON_OBJECT: &str = "org/json/JSONObject";

/// Swaps the key of a `JSONObject.get*()` call for a key used by an earlier
/// call to the same getter in the same method.
pub struct JsonChangeGetParam;

impl MutatorFactory for JsonChangeGetParam {
    fn name(&self) -> &'static str {
        "json_get_param"
    }

    fn excluded_prefix(&self) -> Option<&'static str> {
        Some("org/json/")
    }

    fn create(&self, _method: &MethodInfo<'_>) -> Box<dyn MethodTransformer> {
        Box::new(GetParamVisitor::default())
    }
}

#[derive(Default)]
struct GetParamVisitor {
    /// Getter name -> distinct string keys in order of first use.
    seen: HashMap<String, Vec<String>>,
    /// String constant pushed by the instruction directly before the call.
    pending_key: Option<String>,
}

impl GetParamVisitor {
    fn recycled_key(&self, getter: &str, current: &str) -> Option<String> {
        self.seen
            .get(getter)?
            .iter()
            .find(|k| k.as_str() != current)
            .cloned()
    }

    fn remember(&mut self, getter: &str, key: String) {
        let keys = self.seen.entry(getter.to_string()).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
}

impl MethodTransformer for GetParamVisitor {
    fn visit(&mut self, insn: Insn, ctx: &mut MutationContext, out: &mut Vec<Insn>) {
        match &insn {
            Insn::Ldc { value } => {
                self.pending_key = value.as_str().map(str::to_string);
                out.push(insn);
            }
            Insn::Label { .. } | Insn::LineNumber { .. } => out.push(insn),
            Insn::Method { member, .. }
                if member.owner == JSON_OBJECT && member.name.starts_with("get") =>
            {
                let Some(key) = self.pending_key.take() else {
                    // Key is not a constant: nothing to recycle or remember.
                    out.push(insn);
                    return;
                };
                let getter = member.name.clone();
                match self.recycled_key(&getter, &key) {
                    Some(other) => {
                        let id = ctx.register_mutation(
                            "json_get_param",
                            format!("Changed parameter of {} to {}", getter, other),
                        );
                        if ctx.should_mutate(&id) {
                            out.push(Insn::simple(Opcode::Pop));
                            out.push(Insn::ldc_str(&other));
                        }
                        out.push(insn);
                    }
                    None => out.push(insn),
                }
                self.remember(&getter, key);
            }
            _ => {
                self.pending_key = None;
                out.push(insn);
            }
        }
    }
}
