//! Sequential composition of instruction stream transformers.
//!
//! Every instruction of a method enters the first stage; whatever a stage
//! emits is handed to the next stage immediately, before the following input
//! instruction is read. Registration order of mutation sites therefore follows
//! the instruction stream.

use crate::classfile::MethodBody;
use crate::context::{ClassInfo, MutationContext};
use crate::insn::Insn;

/// One stage of the chain: consumes one instruction, emits zero or more.
pub trait MethodTransformer {
    fn visit(&mut self, insn: Insn, ctx: &mut MutationContext, out: &mut Vec<Insn>);
}

/// The method a transformer is created for.
#[derive(Debug, Clone, Copy)]
pub struct MethodInfo<'a> {
    pub class: &'a ClassInfo,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub access: u16,
}

/// A mutation policy. Creates a fresh transformer per method body.
pub trait MutatorFactory: Send + Sync {
    fn name(&self) -> &'static str;

    /// Classes whose internal name starts with this prefix are never mutated
    /// by the policy (its own reference implementations live there).
    fn excluded_prefix(&self) -> Option<&'static str> {
        None
    }

    fn create(&self, method: &MethodInfo<'_>) -> Box<dyn MethodTransformer>;
}

/// First stage of every chain: keeps the context's current line in step with
/// the line markers of the stream.
struct LineTracker;

impl MethodTransformer for LineTracker {
    fn visit(&mut self, insn: Insn, ctx: &mut MutationContext, out: &mut Vec<Insn>) {
        if let Insn::LineNumber { line, .. } = insn {
            ctx.register_current_line(line);
        }
        out.push(insn);
    }
}

/// Run `method` through the given policies and return the rewritten stream.
pub fn transform_method(
    method: &MethodBody,
    factories: &[Box<dyn MutatorFactory>],
    ctx: &mut MutationContext,
) -> Vec<Insn> {
    ctx.enter_method(&method.signature());

    let mut stages: Vec<Box<dyn MethodTransformer>> = vec![Box::new(LineTracker)];
    {
        let info = MethodInfo {
            class: ctx.class(),
            name: &method.name,
            descriptor: &method.descriptor,
            access: method.access,
        };
        for factory in factories {
            if let Some(prefix) = factory.excluded_prefix() {
                if info.class.is_within(prefix) {
                    continue;
                }
            }
            stages.push(factory.create(&info));
        }
    }

    let mut sink = Vec::with_capacity(method.instructions.len());
    for insn in &method.instructions {
        feed(&mut stages, insn.clone(), ctx, &mut sink);
    }
    sink
}

fn feed(
    stages: &mut [Box<dyn MethodTransformer>],
    insn: Insn,
    ctx: &mut MutationContext,
    sink: &mut Vec<Insn>,
) {
    match stages.split_first_mut() {
        None => sink.push(insn),
        Some((head, rest)) => {
            let mut out = Vec::new();
            head.visit(insn, ctx, &mut out);
            for emitted in out {
                feed(rest, emitted, ctx, sink);
            }
        }
    }
}
