use crate::chain::{MethodInfo, MethodTransformer, MutatorFactory};
use crate::context::MutationContext;
use crate::insn::{Insn, Opcode};

/// Registers a site for every instruction but never changes anything.
///
/// Every mutant it produces must be byte-identical to the original class,
/// which makes it handy for checking the engine itself.
pub struct NullMutateEverything;

impl MutatorFactory for NullMutateEverything {
    fn name(&self) -> &'static str {
        "null_mutate"
    }

    fn create(&self, _method: &MethodInfo<'_>) -> Box<dyn MethodTransformer> {
        Box::new(NullVisitor)
    }
}

struct NullVisitor;

impl MethodTransformer for NullVisitor {
    fn visit(&mut self, insn: Insn, ctx: &mut MutationContext, out: &mut Vec<Insn>) {
        match insn.opcode() {
            None | Some(Opcode::Return) => {}
            Some(op) => {
                ctx.register_mutation("null_mutate", format!("Null mutation with {}", op));
            }
        }
        out.push(insn);
    }
}
