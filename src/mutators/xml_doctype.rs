use crate::chain::{MethodInfo, MethodTransformer, MutatorFactory};
use crate::context::MutationContext;
use crate::insn::{Insn, Opcode};

const PARSER_FACTORY: &str = "org/xmlpull/v1/XmlPullParserFactory";
const PARSER: &str = "org/xmlpull/v1/XmlPullParser";
const FEATURE_PROCESS_DOCDECL: &str = "http://xmlpull.org/v1/doc/features.html#process-docdecl";

/// Enables DOCTYPE processing on freshly created pull parsers, as if
/// `parser.setFeature(FEATURE_PROCESS_DOCDECL, true)` followed
/// `XmlPullParserFactory.newPullParser()`.
pub struct XmlEnabledDoctypeParsing;

impl MutatorFactory for XmlEnabledDoctypeParsing {
    fn name(&self) -> &'static str {
        "xml_doctype_parsing"
    }

    fn excluded_prefix(&self) -> Option<&'static str> {
        Some("org/xmlpull/")
    }

    fn create(&self, _method: &MethodInfo<'_>) -> Box<dyn MethodTransformer> {
        Box::new(DoctypeVisitor { state: ParserState::BeforeCreation })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    BeforeCreation,
    Created,
    Stored,
}

struct DoctypeVisitor {
    state: ParserState,
}

/// `setFeature` call expecting the parser on top of the stack.
fn enable_doctype() -> [Insn; 3] {
    [
        Insn::ldc_str(FEATURE_PROCESS_DOCDECL),
        Insn::simple(Opcode::Iconst1),
        Insn::invoke(Opcode::Invokeinterface, PARSER, "setFeature", "(Ljava/lang/String;Z)V", true),
    ]
}

impl MethodTransformer for DoctypeVisitor {
    fn visit(&mut self, insn: Insn, ctx: &mut MutationContext, out: &mut Vec<Insn>) {
        match (self.state, &insn) {
            (ParserState::BeforeCreation, Insn::Method { op: Opcode::Invokevirtual, member, .. })
                if member.owner == PARSER_FACTORY && member.name == "newPullParser" =>
            {
                self.state = ParserState::Created;
                out.push(insn);
            }
            // The first reference store after creation is assumed to hold the parser.
            (ParserState::Created, Insn::Var { op: Opcode::Astore, slot }) => {
                let slot = *slot;
                self.state = ParserState::Stored;
                out.push(insn);
                let id = ctx.register_mutation(
                    "xml_doctype_parsing",
                    "Added call to setFeature(FEATURE_PROCESS_DOCDECL, true)",
                );
                if ctx.should_mutate(&id) {
                    out.push(Insn::var(Opcode::Aload, slot));
                    out.extend(enable_doctype());
                }
            }
            // A parser that is returned right away.
            (ParserState::Created, Insn::Simple { op: Opcode::Areturn }) => {
                self.state = ParserState::Stored;
                let id = ctx.register_mutation(
                    "xml_doctype_parsing",
                    "Added call to setFeature(FEATURE_PROCESS_DOCDECL, true)",
                );
                if ctx.should_mutate(&id) {
                    out.push(Insn::simple(Opcode::Dup));
                    out.extend(enable_doctype());
                }
                out.push(insn);
            }
            _ => out.push(insn),
        }
    }
}
