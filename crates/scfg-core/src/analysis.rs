//! Graph analyses: head discovery, strongly connected components,
//! region boundary sets, reachability.
//!
//! All analyses walk *effective* edges (backedges excluded) except header
//! discovery, which considers raw targets so that a latch pointing at its
//! header through a backedge still counts as that header's predecessor.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::Scfg;

impl Scfg {
    /// Returns the unique block without an incoming effective edge.
    ///
    /// Requires a closed graph; fails with `NoHead`/`MultipleHeads`
    /// otherwise.
    pub fn find_head(&self) -> Result<String> {
        let mut heads: BTreeSet<&str> = self.names().collect();
        for block in self.blocks() {
            for target in block.effective_jump_targets() {
                heads.remove(target);
            }
        }
        let mut heads = heads.into_iter();
        match (heads.next(), heads.next()) {
            (Some(head), None) => Ok(head.to_string()),
            (None, _) => Err(Error::NoHead),
            (Some(first), Some(second)) => {
                let mut all = vec![first.to_string(), second.to_string()];
                all.extend(heads.map(str::to_string));
                Err(Error::MultipleHeads(all))
            }
        }
    }

    /// Strongly connected components of the whole graph.
    pub fn compute_scc(&self) -> Vec<BTreeSet<String>> {
        let nodes: BTreeSet<String> = self.names().map(str::to_string).collect();
        self.compute_scc_subgraph(&nodes)
    }

    /// Strongly connected components of the subgraph induced by `nodes`,
    /// over effective edges. Iterative Tarjan; components are emitted in
    /// completion order and are internally sorted by name.
    pub fn compute_scc_subgraph(&self, nodes: &BTreeSet<String>) -> Vec<BTreeSet<String>> {
        let targets = |v: &str| -> Vec<String> {
            match self.get(v) {
                Some(block) => block
                    .effective_jump_targets()
                    .filter(|t| nodes.contains(*t))
                    .map(str::to_string)
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut preorder: HashMap<String, usize> = HashMap::new();
        let mut lowlink: HashMap<String, usize> = HashMap::new();
        let mut found: HashSet<String> = HashSet::new();
        let mut pending: Vec<String> = Vec::new();
        let mut components = Vec::new();
        let mut counter = 0usize;

        // Sources are visited in insertion order for reproducibility.
        let sources: Vec<String> = self
            .names()
            .filter(|n| nodes.contains(*n))
            .map(str::to_string)
            .collect();
        for source in sources {
            if found.contains(&source) {
                continue;
            }
            let mut stack = vec![source];
            while let Some(v) = stack.last().cloned() {
                if !preorder.contains_key(&v) {
                    counter += 1;
                    preorder.insert(v.clone(), counter);
                }
                let mut done = true;
                for w in targets(&v) {
                    if !preorder.contains_key(&w) {
                        stack.push(w);
                        done = false;
                        break;
                    }
                }
                if !done {
                    continue;
                }
                let mut low = preorder[&v];
                for w in targets(&v) {
                    if found.contains(&w) {
                        continue;
                    }
                    low = low.min(if preorder[&w] > preorder[&v] {
                        lowlink[&w]
                    } else {
                        preorder[&w]
                    });
                }
                lowlink.insert(v.clone(), low);
                stack.pop();
                if low == preorder[&v] {
                    let mut component: BTreeSet<String> = BTreeSet::new();
                    component.insert(v.clone());
                    while pending.last().is_some_and(|k| preorder[k] > preorder[&v]) {
                        if let Some(member) = pending.pop() {
                            component.insert(member);
                        }
                    }
                    found.extend(component.iter().cloned());
                    components.push(component);
                } else {
                    pending.push(v);
                }
            }
        }
        components
    }

    /// Headers and entries of a node subset.
    ///
    /// Headers are members of `subgraph` with a predecessor outside it;
    /// entries are the outside blocks holding those edges. When no block
    /// outside points in, the graph head is the sole header and the entry
    /// set is empty.
    pub fn find_headers_and_entries(
        &self,
        subgraph: &BTreeSet<String>,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let mut headers: BTreeSet<String> = BTreeSet::new();
        let mut entries: BTreeSet<String> = BTreeSet::new();
        for (name, block) in self.names().zip(self.blocks()) {
            if subgraph.contains(name) {
                continue;
            }
            let mut points_in = false;
            for target in block.jump_targets() {
                if subgraph.contains(target) {
                    headers.insert(target.clone());
                    points_in = true;
                }
            }
            if points_in {
                entries.insert(name.to_string());
            }
        }
        if headers.is_empty() {
            headers.insert(self.find_head()?);
        }
        Ok((
            headers.into_iter().collect(),
            entries.into_iter().collect(),
        ))
    }

    /// Exiting blocks and exits of a node subset.
    ///
    /// Exiting blocks are members of `subgraph` with an effective edge
    /// leaving it (blocks without successors count as exiting); exits are
    /// the targets of those edges.
    pub fn find_exiting_and_exits(
        &self,
        subgraph: &BTreeSet<String>,
    ) -> (Vec<String>, Vec<String>) {
        let mut exiting: BTreeSet<String> = BTreeSet::new();
        let mut exits: BTreeSet<String> = BTreeSet::new();
        for inside in subgraph {
            let Some(block) = self.get(inside) else {
                continue;
            };
            for target in block.effective_jump_targets() {
                if !subgraph.contains(target) {
                    exiting.insert(inside.clone());
                    exits.insert(target.to_string());
                }
            }
            if block.is_exiting() {
                exiting.insert(inside.clone());
            }
        }
        (exiting.into_iter().collect(), exits.into_iter().collect())
    }

    /// Depth-first reachability over effective edges. `end` may name a
    /// block outside this graph (a parent-level successor).
    pub fn is_reachable_dfs(&self, begin: &str, end: &str) -> bool {
        let Some(begin_block) = self.get(begin) else {
            return false;
        };
        let mut seen: HashSet<String> = HashSet::new();
        let mut to_visit: Vec<String> = begin_block
            .effective_jump_targets()
            .map(str::to_string)
            .collect();
        while let Some(name) = to_visit.pop() {
            if name == end {
                return true;
            }
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(block) = self.get(&name) {
                to_visit.extend(block.effective_jump_targets().map(str::to_string));
            }
        }
        false
    }

    /// Blocks in reverse post-order from the head, over effective
    /// in-graph edges. Unreachable blocks are not included.
    pub fn reverse_post_order(&self) -> Vec<String> {
        fn dfs(scfg: &Scfg, name: &str, visited: &mut HashSet<String>, post: &mut Vec<String>) {
            if !visited.insert(name.to_string()) {
                return;
            }
            if let Some(block) = scfg.get(name) {
                for target in block.effective_jump_targets() {
                    if scfg.contains(target) {
                        dfs(scfg, target, visited, post);
                    }
                }
                post.push(name.to_string());
            }
        }

        let Ok(head) = self.find_head() else {
            return Vec::new();
        };
        let mut visited = HashSet::new();
        let mut post = Vec::new();
        dfs(self, &head, &mut visited, &mut post);
        post.reverse();
        post
    }

    /// Names present in the graph but not reachable from the head.
    ///
    /// Transformations preserve unreachable blocks; this analysis exists
    /// so callers can flag them.
    pub fn unreachable_blocks(&self) -> Result<Vec<String>> {
        let head = self.find_head()?;
        let mut seen: HashSet<String> = HashSet::new();
        let mut to_visit = VecDeque::from([head]);
        while let Some(name) = to_visit.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(block) = self.get(&name) {
                to_visit.extend(block.effective_jump_targets().map(str::to_string));
            }
        }
        Ok(self
            .names()
            .filter(|n| !seen.contains(*n))
            .map(str::to_string)
            .collect())
    }
}
