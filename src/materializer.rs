//! Re-emits classes with one selected mutation applied.

use crate::chain::{transform_method, MutatorFactory};
use crate::classfile::ClassFile;
use crate::context::{ClassInfo, MutationContext, MutationDetails, MutationIdentifier};
use crate::error::{Error, Result};
use crate::mutants::Mutant;

/// One pass over every method of `class`. With `target == None` nothing is
/// rewritten and the pass only collects the mutation sites.
pub fn mutate_class(
    class: &ClassFile,
    factories: &[Box<dyn MutatorFactory>],
    target: Option<&MutationIdentifier>,
) -> (ClassFile, MutationContext) {
    let mut ctx = MutationContext::new(ClassInfo::of(class), target.cloned());
    let mut out = class.clone();
    for method in out.methods.iter_mut() {
        let rewritten = transform_method(method, factories, &mut ctx);
        if rewritten != method.instructions {
            method.instructions = rewritten;
            method.prune_dangling_labels();
        }
    }
    (out, ctx)
}

/// All mutation sites of `class`, in issue order.
pub fn find_mutations(class: &ClassFile, factories: &[Box<dyn MutatorFactory>]) -> Vec<MutationDetails> {
    let (_, ctx) = mutate_class(class, factories, None);
    ctx.into_registered()
}

pub fn materialize(
    class: &ClassFile,
    factories: &[Box<dyn MutatorFactory>],
    target: &MutationIdentifier,
) -> Result<Mutant> {
    let (mutated, ctx) = mutate_class(class, factories, Some(target));

    let matching: Vec<&MutationDetails> = ctx
        .registered()
        .iter()
        .filter(|d| d.id == *target)
        .collect();
    let details = match matching.as_slice() {
        [] => return Err(Error::MutationNotFound(target.clone())),
        [only] => (*only).clone(),
        _ => {
            return Err(Error::InvariantViolation(format!(
                "identifier {} issued {} times",
                target,
                matching.len()
            )));
        }
    };
    if ctx.live_answers() > 1 {
        return Err(Error::InvariantViolation(format!(
            "{} live mutations in one mutant",
            ctx.live_answers()
        )));
    }

    let diff = match (class.method(&target.method), mutated.method(&target.method)) {
        (Some(before), Some(after)) => generate_diff(&before.listing(), &after.listing()),
        _ => String::new(),
    };
    let bytes = mutated.to_bytes()?;
    Ok(Mutant { details, bytes, diff })
}

pub fn generate_diff(original: &str, mutated: &str) -> String {
    use similar::TextDiff;
    let diff = TextDiff::from_lines(original, mutated);
    let mut output = String::new();
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => {
                output.push_str(&format!("- {}", change));
            }
            similar::ChangeTag::Insert => {
                output.push_str(&format!("+ {}", change));
            }
            _ => {}
        }
    }
    output
}
