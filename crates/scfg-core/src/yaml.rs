//! Serialized form of an SCFG.
//!
//! The textual form is a YAML mapping from block name to a block entry
//! with keys `type`, `jt` (ordered jump targets) and optionally `be`
//! (backedges), plus variant-specific fields. A region entry carries its
//! subregion recursively under a `blocks` key. Parsing goes through
//! serde; emission is hand-rolled so that equal graphs serialize to
//! byte-identical text (sorted names, fixed key order, flow-style lists).

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::block::{
    Block, BlockKind, BranchTable, RegionData, RegionKind, BASIC, BYTECODE, REGION, SYNTH_ASSIGN,
    SYNTH_EXIT, SYNTH_EXIT_BRANCH, SYNTH_EXITING_LATCH, SYNTH_FILL, SYNTH_HEAD, SYNTH_RETURN,
    SYNTH_TAIL,
};
use crate::error::{Error, Result};
use crate::name_gen::NameGenerator;
use crate::Scfg;

/// The in-memory document equivalent of the YAML form.
pub type ScfgDoc = BTreeMap<String, BlockDoc>;

/// One block entry of the document form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDoc {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub jt: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub be: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigns: Option<BTreeMap<String, i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<BTreeMap<i64, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exiting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<ScfgDoc>,
}

impl BlockDoc {
    fn bare(ty: &str, jt: Vec<String>, be: Vec<String>) -> Self {
        Self {
            ty: ty.to_string(),
            jt,
            be,
            begin: None,
            end: None,
            assigns: None,
            variable: None,
            table: None,
            kind: None,
            header: None,
            exiting: None,
            blocks: None,
        }
    }
}

impl Scfg {
    /// Parses the YAML form. Fails on unknown block types, missing variant
    /// fields and dangling references.
    pub fn from_yaml(text: &str) -> Result<Scfg> {
        let doc: ScfgDoc = serde_yaml::from_str(text)?;
        Self::from_doc(&doc)
    }

    /// Builds a graph from the document form.
    pub fn from_doc(doc: &ScfgDoc) -> Result<Scfg> {
        let gen = NameGenerator::new();
        let scfg = build_graph(doc, &gen)?;
        validate_references(&scfg, &HashSet::new())?;
        Ok(scfg)
    }

    /// Serializes to the document form.
    pub fn to_doc(&self) -> ScfgDoc {
        let mut doc = ScfgDoc::new();
        for block in self.blocks() {
            doc.insert(block.name().to_string(), block_to_doc(block));
        }
        doc
    }

    /// Serializes to the YAML form. Output is deterministic: two equal
    /// graphs produce byte-identical text.
    pub fn to_yaml(&self) -> String {
        let mut out = String::new();
        write_doc(&mut out, &self.to_doc(), 0);
        out
    }
}

fn build_graph(doc: &ScfgDoc, gen: &NameGenerator) -> Result<Scfg> {
    let mut scfg = Scfg::with_name_gen(gen.clone());
    for (name, entry) in doc {
        gen.observe_name(name);
        let kind = kind_from_doc(name, entry, gen)?;
        let block = Block::new(name.clone(), entry.jt.clone(), kind)
            .with_backedges(entry.be.clone());
        scfg.add_block(block)?;
    }
    Ok(scfg)
}

fn kind_from_doc(name: &str, entry: &BlockDoc, gen: &NameGenerator) -> Result<BlockKind> {
    let missing = |field: &str| {
        Error::Malformed(format!("block {name:?} ({}) lacks {field:?}", entry.ty))
    };
    match entry.ty.as_str() {
        BASIC => Ok(BlockKind::Basic),
        BYTECODE => Ok(BlockKind::Bytecode {
            begin: entry.begin.ok_or_else(|| missing("begin"))?,
            end: entry.end.ok_or_else(|| missing("end"))?,
        }),
        SYNTH_EXIT => Ok(BlockKind::SyntheticExit),
        SYNTH_RETURN => Ok(BlockKind::SyntheticReturn),
        SYNTH_TAIL => Ok(BlockKind::SyntheticTail),
        SYNTH_FILL => Ok(BlockKind::SyntheticFill),
        SYNTH_ASSIGN => Ok(BlockKind::SyntheticAssignment {
            assignments: entry.assigns.clone().unwrap_or_default(),
        }),
        SYNTH_HEAD | SYNTH_EXITING_LATCH | SYNTH_EXIT_BRANCH => {
            let table = BranchTable {
                variable: entry.variable.clone().ok_or_else(|| missing("variable"))?,
                table: entry.table.clone().unwrap_or_default().into_iter().collect(),
            };
            Ok(match entry.ty.as_str() {
                SYNTH_HEAD => BlockKind::SyntheticHead(table),
                SYNTH_EXITING_LATCH => BlockKind::SyntheticExitingLatch(table),
                _ => BlockKind::SyntheticExitBranch(table),
            })
        }
        REGION => {
            let kind_str = entry.kind.as_deref().ok_or_else(|| missing("kind"))?;
            let kind = RegionKind::from_str(kind_str).ok_or_else(|| {
                Error::Malformed(format!("block {name:?} has unknown region kind {kind_str:?}"))
            })?;
            let blocks = entry.blocks.as_ref().ok_or_else(|| missing("blocks"))?;
            Ok(BlockKind::Region(Box::new(RegionData {
                kind,
                header: entry.header.clone().ok_or_else(|| missing("header"))?,
                subregion: build_graph(blocks, gen)?,
                exiting: entry.exiting.clone().ok_or_else(|| missing("exiting"))?,
            })))
        }
        other => Err(Error::Malformed(format!(
            "block {name:?} has unknown type {other:?}"
        ))),
    }
}

/// Checks the closure-of-references invariant: every target names a block
/// in the same graph or in an enclosing graph (legal for a subregion's
/// exiting block).
fn validate_references(scfg: &Scfg, external: &HashSet<String>) -> Result<()> {
    let level: HashSet<String> = scfg.names().map(str::to_string).collect();
    for block in scfg.blocks() {
        for target in block.jump_targets() {
            if !level.contains(target) && !external.contains(target) {
                return Err(Error::UndefinedReference {
                    block: block.name().to_string(),
                    target: target.clone(),
                });
            }
        }
        if let Some(region) = block.region() {
            let mut visible = external.clone();
            visible.extend(level.iter().cloned());
            validate_references(&region.subregion, &visible)?;
            if !region.subregion.contains(&region.header) {
                return Err(Error::Malformed(format!(
                    "region {:?} header {:?} is not in its subregion",
                    block.name(),
                    region.header
                )));
            }
            if !region.subregion.contains(&region.exiting) {
                return Err(Error::Malformed(format!(
                    "region {:?} exiting {:?} is not in its subregion",
                    block.name(),
                    region.exiting
                )));
            }
        }
    }
    Ok(())
}

fn block_to_doc(block: &Block) -> BlockDoc {
    let mut doc = BlockDoc::bare(
        block.kind().type_tag(),
        block.jump_targets().to_vec(),
        block.backedges().to_vec(),
    );
    match block.kind() {
        BlockKind::Bytecode { begin, end } => {
            doc.begin = Some(*begin);
            doc.end = Some(*end);
        }
        BlockKind::SyntheticAssignment { assignments } => {
            doc.assigns = Some(assignments.clone());
        }
        BlockKind::SyntheticHead(table)
        | BlockKind::SyntheticExitingLatch(table)
        | BlockKind::SyntheticExitBranch(table) => {
            doc.variable = Some(table.variable.clone());
            doc.table = Some(table.table.iter().cloned().collect());
        }
        BlockKind::Region(region) => {
            doc.kind = Some(region.kind.as_str().to_string());
            doc.header = Some(region.header.clone());
            doc.exiting = Some(region.exiting.clone());
            doc.blocks = Some(region.subregion.to_doc());
        }
        _ => {}
    }
    doc
}

fn quote(name: &str) -> String {
    format!("'{name}'")
}

fn quoted_list(names: &[String]) -> String {
    let items: Vec<String> = names.iter().map(|n| quote(n)).collect();
    format!("[{}]", items.join(", "))
}

fn write_doc(out: &mut String, doc: &ScfgDoc, depth: usize) {
    let pad = "  ".repeat(depth);
    for (name, entry) in doc {
        let _ = writeln!(out, "{pad}{}:", quote(name));
        write_entry(out, entry, depth + 1);
    }
}

fn write_entry(out: &mut String, entry: &BlockDoc, depth: usize) {
    let pad = "  ".repeat(depth);
    let _ = writeln!(out, "{pad}type: {}", entry.ty);
    let _ = writeln!(out, "{pad}jt: {}", quoted_list(&entry.jt));
    if !entry.be.is_empty() {
        let _ = writeln!(out, "{pad}be: {}", quoted_list(&entry.be));
    }
    if let Some(begin) = entry.begin {
        let _ = writeln!(out, "{pad}begin: {begin}");
    }
    if let Some(end) = entry.end {
        let _ = writeln!(out, "{pad}end: {end}");
    }
    if let Some(assigns) = &entry.assigns {
        let items: Vec<String> = assigns.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        let _ = writeln!(out, "{pad}assigns: {{{}}}", items.join(", "));
    }
    if let Some(variable) = &entry.variable {
        let _ = writeln!(out, "{pad}variable: {variable}");
    }
    if let Some(table) = &entry.table {
        let items: Vec<String> = table
            .iter()
            .map(|(value, target)| format!("{value}: {}", quote(target)))
            .collect();
        let _ = writeln!(out, "{pad}table: {{{}}}", items.join(", "));
    }
    if let Some(kind) = &entry.kind {
        let _ = writeln!(out, "{pad}kind: {kind}");
    }
    if let Some(header) = &entry.header {
        let _ = writeln!(out, "{pad}header: {}", quote(header));
    }
    if let Some(exiting) = &entry.exiting {
        let _ = writeln!(out, "{pad}exiting: {}", quote(exiting));
    }
    if let Some(blocks) = &entry.blocks {
        let _ = writeln!(out, "{pad}blocks:");
        write_doc(out, blocks, depth + 1);
    }
}
