//! # scfg-render
//!
//! Graphviz DOT rendering for SCFGs. Every region becomes a cluster
//! labeled with its kind; backedges are drawn dashed. Edges that target a
//! region are resolved to the region's (innermost) header block so the
//! arrow lands on a concrete node.

use std::collections::HashMap;
use std::fmt::Write as _;

use scfg_core::{Block, BlockKind, Scfg};

/// Escape special characters for DOT format strings.
pub fn escape_dot_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('<', "\\<")
        .replace('>', "\\>")
}

/// Configuration for DOT output generation.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Font name for nodes and edges.
    pub font_name: String,
    /// Font size for node labels.
    pub font_size: u32,
    /// Graph direction: "TB" (top-bottom), "LR" (left-right), etc.
    pub rankdir: String,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            font_name: "Courier".to_string(),
            font_size: 10,
            rankdir: "TB".to_string(),
        }
    }
}

/// Renders an [`Scfg`] to DOT text.
pub struct ScfgRenderer<'a> {
    scfg: &'a Scfg,
    config: DotConfig,
}

impl<'a> ScfgRenderer<'a> {
    pub fn new(scfg: &'a Scfg) -> Self {
        Self {
            scfg,
            config: DotConfig::default(),
        }
    }

    pub fn with_config(scfg: &'a Scfg, config: DotConfig) -> Self {
        Self { scfg, config }
    }

    /// Renders the full graph, descending into regions as clusters.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph scfg {{");
        let _ = writeln!(out, "    rankdir={};", self.config.rankdir);
        let _ = writeln!(
            out,
            "    node [shape=rect, fontname=\"{}\", fontsize={}];",
            self.config.font_name, self.config.font_size
        );
        let mut headers = HashMap::new();
        collect_headers(self.scfg, &mut headers);
        render_level(&mut out, self.scfg, 1);
        render_edges(&mut out, self.scfg, &headers);
        out.push_str("}\n");
        out
    }
}

/// Maps every region name to the concrete block its header chain ends at,
/// so edges into a region can be drawn against a rendered node.
fn collect_headers(scfg: &Scfg, headers: &mut HashMap<String, String>) {
    for block in scfg.blocks() {
        if let Some(region) = block.region() {
            let mut leaf = region.header.clone();
            let mut sub = &region.subregion;
            while let Some(inner) = sub.get(&leaf).and_then(Block::region) {
                leaf = inner.header.clone();
                sub = &inner.subregion;
            }
            headers.insert(block.name().to_string(), leaf);
            collect_headers(&region.subregion, headers);
        }
    }
}

fn render_level(out: &mut String, scfg: &Scfg, depth: usize) {
    let pad = "    ".repeat(depth);
    for block in scfg.blocks() {
        match block.region() {
            Some(region) => {
                let _ = writeln!(
                    out,
                    "{pad}subgraph \"cluster_{}\" {{",
                    escape_dot_string(block.name())
                );
                let _ = writeln!(
                    out,
                    "{pad}    label=\"{} ({})\";",
                    escape_dot_string(block.name()),
                    region.kind.as_str()
                );
                let _ = writeln!(out, "{pad}    color=\"#4d4d4d\";");
                render_level(out, &region.subregion, depth + 1);
                let _ = writeln!(out, "{pad}}}");
            }
            None => {
                let _ = writeln!(
                    out,
                    "{pad}\"{}\" [label=\"{}\"];",
                    escape_dot_string(block.name()),
                    escape_dot_string(&node_label(block))
                );
            }
        }
    }
}

fn node_label(block: &Block) -> String {
    match block.kind() {
        BlockKind::Basic => block.name().to_string(),
        BlockKind::Bytecode { begin, end } => {
            format!("{}\\n[{begin}, {end})", block.name())
        }
        BlockKind::SyntheticAssignment { assignments } => {
            let mut label = block.name().to_string();
            for (variable, value) in assignments {
                let _ = write!(label, "\\n{variable} = {value}");
            }
            label
        }
        BlockKind::SyntheticHead(table)
        | BlockKind::SyntheticExitingLatch(table)
        | BlockKind::SyntheticExitBranch(table) => {
            format!("{}\\nswitch {}", block.name(), table.variable)
        }
        _ => format!("{}\\n({})", block.name(), block.kind().type_tag()),
    }
}

fn render_edges(out: &mut String, scfg: &Scfg, headers: &HashMap<String, String>) {
    for block in scfg.blocks() {
        if let Some(region) = block.region() {
            render_edges(out, &region.subregion, headers);
            continue;
        }
        for target in block.jump_targets() {
            let resolved = headers.get(target).map(String::as_str).unwrap_or(target);
            let style = if block.backedges().contains(target) {
                " [style=dashed]"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "    \"{}\" -> \"{}\"{style};",
                escape_dot_string(block.name()),
                escape_dot_string(resolved)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_dot_string() {
        assert_eq!(escape_dot_string("a \"b\""), "a \\\"b\\\"");
        assert_eq!(escape_dot_string("<x>"), "\\<x\\>");
    }

    #[test]
    fn test_render_plain_graph() {
        let mut scfg = Scfg::new();
        scfg.add_block(Block::basic("a", vec!["b".into()])).unwrap();
        scfg.add_block(Block::basic("b", vec![])).unwrap();
        let dot = ScfgRenderer::new(&scfg).render();
        assert!(dot.starts_with("digraph scfg {"));
        assert!(dot.contains("\"a\" -> \"b\";"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_render_region_as_cluster() {
        let scfg = Scfg::from_yaml(
            "
'entry':
  type: basic
  jt: ['loop_region_0']
'loop_region_0':
  type: region
  jt: ['out']
  kind: loop
  header: 'h'
  exiting: 'latch'
  blocks:
    'h':
      type: basic
      jt: ['latch']
    'latch':
      type: basic
      jt: ['out', 'h']
      be: ['h']
'out':
  type: basic
  jt: []
",
        )
        .unwrap();
        let dot = ScfgRenderer::new(&scfg).render();
        assert!(dot.contains("subgraph \"cluster_loop_region_0\""));
        assert!(dot.contains("(loop)"));
        // The entry edge into the region resolves to the region header.
        assert!(dot.contains("\"entry\" -> \"h\";"));
        // The backedge is dashed.
        assert!(dot.contains("\"latch\" -> \"h\" [style=dashed];"));
    }
}
