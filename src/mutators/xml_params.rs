use crate::chain::{MethodInfo, MethodTransformer, MutatorFactory};
use crate::context::MutationContext;
use crate::insn::{argument_sizes, Insn, Opcode};

/// Changes the index passed to `XmlPullParser.getAttributeValue(int)` to 0.
pub struct XmlChangeGetAttributeValueParam;

impl MutatorFactory for XmlChangeGetAttributeValueParam {
    fn name(&self) -> &'static str {
        "xml_attribute_param"
    }

    fn excluded_prefix(&self) -> Option<&'static str> {
        Some("org/xmlpull/")
    }

    fn create(&self, _method: &MethodInfo<'_>) -> Box<dyn MethodTransformer> {
        Box::new(AttributeParamVisitor)
    }
}

struct AttributeParamVisitor;

impl MethodTransformer for AttributeParamVisitor {
    fn visit(&mut self, insn: Insn, ctx: &mut MutationContext, out: &mut Vec<Insn>) {
        let matches = matches!(
            &insn,
            Insn::Method { member, interface: true, .. }
                if member.owner.ends_with("xmlpull/v1/XmlPullParser")
                    && member.name == "getAttributeValue"
                    && member.descriptor == "(I)Ljava/lang/String;"
        );
        if matches {
            let id = ctx.register_mutation("xml_attribute_param", "Changed parameter of getAttributeValue() to 0");
            if ctx.should_mutate(&id) {
                out.push(Insn::simple(Opcode::Pop));
                out.push(Insn::simple(Opcode::Iconst0));
            }
        }
        out.push(insn);
    }
}

/// Removes calls to `XmlPullParser.require(int, String, String)`.
pub struct XmlRemoveRequire;

const REQUIRE_DESCRIPTOR: &str = "(ILjava/lang/String;Ljava/lang/String;)V";

impl MutatorFactory for XmlRemoveRequire {
    fn name(&self) -> &'static str {
        "xml_remove_require"
    }

    fn excluded_prefix(&self) -> Option<&'static str> {
        Some("org/xmlpull/")
    }

    fn create(&self, _method: &MethodInfo<'_>) -> Box<dyn MethodTransformer> {
        Box::new(RemoveRequireVisitor)
    }
}

struct RemoveRequireVisitor;

/// Instructions discarding the operands a call would have consumed.
pub fn pop_call_operands(op: Opcode, descriptor: &str) -> Option<Vec<Insn>> {
    let mut pops: Vec<Insn> = argument_sizes(descriptor)?
        .into_iter()
        .rev()
        .map(|size| Insn::simple(if size == 2 { Opcode::Pop2 } else { Opcode::Pop }))
        .collect();
    if op != Opcode::Invokestatic {
        pops.push(Insn::simple(Opcode::Pop));
    }
    Some(pops)
}

impl MethodTransformer for RemoveRequireVisitor {
    fn visit(&mut self, insn: Insn, ctx: &mut MutationContext, out: &mut Vec<Insn>) {
        let Insn::Method { op, member, .. } = &insn else {
            out.push(insn);
            return;
        };
        if member.name != "require" || member.descriptor != REQUIRE_DESCRIPTOR {
            out.push(insn);
            return;
        }
        let Some(pops) = pop_call_operands(*op, &member.descriptor) else {
            out.push(insn);
            return;
        };

        let id = ctx.register_mutation(
            "xml_remove_require",
            format!("removed call to {}::{}", member.owner, member.name),
        );
        if ctx.should_mutate(&id) {
            out.extend(pops);
        } else {
            out.push(insn);
        }
    }
}
