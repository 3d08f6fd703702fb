use crate::chain::{MethodInfo, MethodTransformer, MutatorFactory};
use crate::context::MutationContext;
use crate::insn::{Constant, Insn, MemberRef, Opcode};

const JSON_OBJECT: &str = "org/json/JSONObject";

/// Changes the default value of `JSONObject.opt*()` lookups.
///
/// Calls without an explicit default are rewritten to the overload that takes
/// one; calls with an explicit default get it popped and replaced.
pub struct JsonChangeDefaultValue;

impl MutatorFactory for JsonChangeDefaultValue {
    fn name(&self) -> &'static str {
        "json_default_value"
    }

    fn excluded_prefix(&self) -> Option<&'static str> {
        Some("org/json/")
    }

    fn create(&self, _method: &MethodInfo<'_>) -> Box<dyn MethodTransformer> {
        Box::new(DefaultValueVisitor)
    }
}

struct DefaultValueVisitor;

/// Replacement for one `opt*` overload.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultOverride {
    /// Instruction removing the caller's explicit default, if any.
    pub pop: Option<Opcode>,
    /// Instruction pushing the new default.
    pub push: Insn,
    pub shown: &'static str,
    pub descriptor: &'static str,
}

fn is_opt_method(owner: &str, name: &str) -> bool {
    owner == JSON_OBJECT
        && name.starts_with("opt")
        && name != "opt"
        && name != "optJSONArray"
        && name != "optJSONObject"
}

/// Override for a known `opt*` descriptor; `None` for unknown overloads.
pub fn default_override(descriptor: &str) -> Option<DefaultOverride> {
    const BOOL: &str = "(Ljava/lang/String;Z)Z";
    const DOUBLE: &str = "(Ljava/lang/String;D)D";
    const INT: &str = "(Ljava/lang/String;I)I";
    const LONG: &str = "(Ljava/lang/String;J)J";
    const STRING: &str = "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;";

    let (pop, target) = match descriptor {
        BOOL => (Some(Opcode::Pop), BOOL),
        "(Ljava/lang/String;)Z" => (None, BOOL),
        DOUBLE => (Some(Opcode::Pop2), DOUBLE),
        "(Ljava/lang/String;)D" => (None, DOUBLE),
        INT => (Some(Opcode::Pop), INT),
        "(Ljava/lang/String;)I" => (None, INT),
        LONG => (Some(Opcode::Pop2), LONG),
        "(Ljava/lang/String;)J" => (None, LONG),
        STRING => (Some(Opcode::Pop), STRING),
        "(Ljava/lang/String;)Ljava/lang/String;" => (None, STRING),
        _ => return None,
    };
    let (push, shown) = match target {
        BOOL => (Insn::simple(Opcode::Iconst1), "true"),
        DOUBLE => (Insn::ldc(Constant::Double(12345.67)), "12345.67"),
        INT => (Insn::ldc(Constant::Int(1234567)), "1234567"),
        LONG => (Insn::ldc(Constant::Long(1234567)), "1234567"),
        _ => (Insn::ldc_str("qwerty"), "qwerty"),
    };
    Some(DefaultOverride { pop, push, shown, descriptor: target })
}

impl MethodTransformer for DefaultValueVisitor {
    fn visit(&mut self, insn: Insn, ctx: &mut MutationContext, out: &mut Vec<Insn>) {
        let Insn::Method { op, member, interface } = &insn else {
            out.push(insn);
            return;
        };
        if !is_opt_method(&member.owner, &member.name) {
            out.push(insn);
            return;
        }
        let Some(replacement) = default_override(&member.descriptor) else {
            log::debug!("unknown overload {}{}", member.name, member.descriptor);
            out.push(insn);
            return;
        };

        let id = ctx.register_mutation(
            "json_default_value",
            format!("Changed default value of {} to {}", member.name, replacement.shown),
        );
        if !ctx.should_mutate(&id) {
            out.push(insn);
            return;
        }
        if let Some(pop) = replacement.pop {
            out.push(Insn::simple(pop));
        }
        out.push(replacement.push);
        out.push(Insn::Method {
            op: *op,
            member: MemberRef::new(&member.owner, &member.name, replacement.descriptor),
            interface: *interface,
        });
    }
}
