use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::insn::{Insn, Label};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;

/// Suffix of class artifacts inside a class directory.
pub const CLASS_SUFFIX: &str = ".class";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub descriptor: String,
    /// Class-valued `value` element, e.g. the runner of `@RunWith`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryCatchBlock {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    pub catch_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalVariable {
    pub name: String,
    pub descriptor: String,
    pub slot: u16,
    pub start: Label,
    pub end: Label,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodBody {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    pub instructions: Vec<Insn>,
    #[serde(default)]
    pub try_catch: Vec<TryCatchBlock>,
    #[serde(default)]
    pub locals: Vec<LocalVariable>,
    pub max_stack: u16,
    pub max_locals: u16,
}

impl MethodBody {
    pub fn new(name: &str, descriptor: &str, access: u16, instructions: Vec<Insn>) -> Self {
        MethodBody {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access,
            annotations: Vec::new(),
            instructions,
            try_catch: Vec::new(),
            locals: Vec::new(),
            max_stack: 4,
            max_locals: 4,
        }
    }

    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }

    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }

    pub fn lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.instructions.iter().filter_map(|i| match i {
            Insn::LineNumber { line, .. } => Some(*line),
            _ => None,
        })
    }

    /// Drop exception ranges and local variable entries whose labels are no
    /// longer present, e.g. after a body was replaced.
    pub fn prune_dangling_labels(&mut self) {
        let present: HashSet<Label> = self
            .instructions
            .iter()
            .filter_map(|i| match i {
                Insn::Label { label } => Some(*label),
                _ => None,
            })
            .collect();
        self.try_catch.retain(|tc| {
            present.contains(&tc.start) && present.contains(&tc.end) && present.contains(&tc.handler)
        });
        self.locals
            .retain(|lv| present.contains(&lv.start) && present.contains(&lv.end));
        self.instructions.retain(|i| match i {
            Insn::LineNumber { start, .. } => present.contains(start),
            _ => true,
        });
    }

    pub fn listing(&self) -> String {
        let mut out = format!("{}\n", self.signature());
        for insn in &self.instructions {
            out.push_str(&insn.to_string());
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassFile {
    /// Internal name, e.g. `com/example/Net`.
    pub name: String,
    pub super_name: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    pub access: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    pub methods: Vec<MethodBody>,
}

impl ClassFile {
    pub fn new(name: &str) -> Self {
        ClassFile {
            name: name.to_string(),
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            access: ACC_PUBLIC,
            source_file: None,
            annotations: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn from_bytes(bytes: &[u8], origin: &Path) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| Error::Codec {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Serialized artifact form. Identical models always produce identical bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|source| Error::Encode {
            class: self.name.clone(),
            source,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        Self::from_bytes(&bytes, path)
    }

    pub fn method(&self, signature: &str) -> Option<&MethodBody> {
        self.methods.iter().find(|m| m.signature() == signature)
    }

    /// Distinct source lines of the class in ascending order.
    pub fn lines(&self) -> Vec<u32> {
        let set: BTreeSet<u32> = self.methods.iter().flat_map(|m| m.lines()).collect();
        set.into_iter().collect()
    }

    /// Number of coverage probes: one class-level probe plus one per line.
    pub fn probe_count(&self) -> usize {
        1 + self.lines().len()
    }

    pub fn java_name(&self) -> String {
        self.name.replace('/', ".")
    }
}

/// Location of the artifact for an internal class name.
pub fn artifact_path(classes_dir: &Path, internal_name: &str) -> PathBuf {
    let mut path = classes_dir.to_path_buf();
    for part in internal_name.split('/') {
        path.push(part);
    }
    path.set_extension("class");
    path
}

/// Internal class name for an artifact path below `classes_dir`.
pub fn internal_name(classes_dir: &Path, artifact: &Path) -> Option<String> {
    let rel = artifact.strip_prefix(classes_dir).ok()?;
    let rel = rel.to_str()?.strip_suffix(CLASS_SUFFIX)?;
    Some(rel.replace(std::path::MAIN_SEPARATOR, "/"))
}

/// All class artifacts below `dir`, sorted by path.
pub fn scan_artifacts(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(dir, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let ft = entry.file_type().map_err(|e| Error::io(&path, e))?;
        if ft.is_dir() {
            walk(&path, found)?;
        } else if ft.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(CLASS_SUFFIX) && !n.starts_with('.'))
        {
            found.push(path);
        }
    }
    Ok(())
}
