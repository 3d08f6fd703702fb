use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classfile::ClassFile;

/// Stable handle for one candidate change site.
///
/// Identifiers are issued in traversal order, so the same input always yields
/// the same numbering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationIdentifier {
    pub policy: String,
    pub class_name: String,
    pub method: String,
    pub index: usize,
    pub description: String,
}

impl fmt::Display for MutationIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} #{} [{}]",
            self.class_name, self.method, self.index, self.policy
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationDetails {
    pub id: MutationIdentifier,
    /// Source line the mutation is attributed to (0 when no line marker was seen).
    pub line: u32,
    pub source_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub interfaces: Vec<String>,
    pub source_file: Option<String>,
}

impl ClassInfo {
    pub fn of(class: &ClassFile) -> Self {
        ClassInfo {
            name: class.name.clone(),
            interfaces: class.interfaces.clone(),
            source_file: class.source_file.clone(),
        }
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }

    pub fn is_within(&self, prefix: &str) -> bool {
        self.name.starts_with(prefix)
    }
}

/// Per-class mutation session.
///
/// `should_mutate` is the only place where a policy learns whether its site is
/// live, so at most one site per pass can ever be rewritten.
#[derive(Debug)]
pub struct MutationContext {
    class: ClassInfo,
    method: String,
    current_line: u32,
    target: Option<MutationIdentifier>,
    issued: usize,
    registered: Vec<MutationDetails>,
    live_answers: usize,
}

impl MutationContext {
    pub fn new(class: ClassInfo, target: Option<MutationIdentifier>) -> Self {
        MutationContext {
            class,
            method: String::new(),
            current_line: 0,
            target,
            issued: 0,
            registered: Vec::new(),
            live_answers: 0,
        }
    }

    pub fn class(&self) -> &ClassInfo {
        &self.class
    }

    pub fn enter_method(&mut self, signature: &str) {
        self.method = signature.to_string();
        self.current_line = 0;
    }

    pub fn register_current_line(&mut self, line: u32) {
        self.current_line = line;
    }

    pub fn current_line(&self) -> u32 {
        self.current_line
    }

    pub fn register_mutation(&mut self, policy: &str, description: impl Into<String>) -> MutationIdentifier {
        let id = MutationIdentifier {
            policy: policy.to_string(),
            class_name: self.class.name.clone(),
            method: self.method.clone(),
            index: self.issued,
            description: description.into(),
        };
        self.issued += 1;
        log::debug!("registered {} at line {}", id, self.current_line);
        self.registered.push(MutationDetails {
            id: id.clone(),
            line: self.current_line,
            source_file: self.class.source_file.clone(),
        });
        id
    }

    pub fn should_mutate(&mut self, id: &MutationIdentifier) -> bool {
        let live = self.target.as_ref() == Some(id);
        if live {
            self.live_answers += 1;
        }
        live
    }

    pub fn issued(&self) -> usize {
        self.issued
    }

    /// How many times `should_mutate` answered true during this pass.
    pub fn live_answers(&self) -> usize {
        self.live_answers
    }

    pub fn registered(&self) -> &[MutationDetails] {
        &self.registered
    }

    pub fn into_registered(self) -> Vec<MutationDetails> {
        self.registered
    }
}
