//! Layer graph arena, traversal and construction-time validation.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::schema::{ConfigError, Population};

use super::{Context, NodeKind, PipelineError};

/// Issues unique node names (`Kind` + counter).
///
/// Clones share the counter, so one registry can be handed to several graphs
/// that must not collide.
#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    counter: Arc<AtomicUsize>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_name(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", prefix, n)
    }

    /// Number of names issued since the last reset.
    pub fn issued(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }
}

/// Index of a node in a [`LayerGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A node with its edges and last-produced snapshot.
#[derive(Debug)]
pub struct Node {
    name: String,
    kind: NodeKind,
    next: Vec<NodeId>,
    prev_count: usize,
    population: Option<Population>,
    fitness: Option<Vec<f64>>,
    context: Option<Context>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    pub fn next(&self) -> &[NodeId] {
        &self.next
    }

    pub fn prev_count(&self) -> usize {
        self.prev_count
    }

    pub fn population(&self) -> Option<&Population> {
        self.population.as_ref()
    }

    pub fn fitness(&self) -> Option<&[f64]> {
        self.fitness.as_deref()
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Arena of pipeline nodes connected by directed edges.
#[derive(Debug, Default)]
pub struct LayerGraph {
    nodes: Vec<Node>,
    registry: NameRegistry,
}

impl LayerGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: NameRegistry) -> Self {
        Self {
            nodes: Vec::new(),
            registry,
        }
    }

    pub fn registry(&self) -> &NameRegistry {
        &self.registry
    }

    /// Add a node named after its kind.
    pub fn add(&mut self, kind: impl Into<NodeKind>) -> NodeId {
        let kind = kind.into();
        let name = self.registry.next_name(kind.kind());
        self.push(name, kind)
    }

    /// Add a node under an explicit name.
    pub fn add_named(&mut self, kind: impl Into<NodeKind>, name: impl Into<String>) -> NodeId {
        self.push(name.into(), kind.into())
    }

    fn push(&mut self, name: String, kind: NodeKind) -> NodeId {
        self.nodes.push(Node {
            name,
            kind,
            next: Vec::new(),
            prev_count: 0,
            population: None,
            fitness: None,
            context: None,
        });
        NodeId(self.nodes.len() - 1)
    }

    fn check(&self, id: NodeId) -> Result<(), ConfigError> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(ConfigError::UnknownNode(id.0))
        }
    }

    /// Add the edge `from -> to`. Repeated edges are ignored.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), ConfigError> {
        self.check(from)?;
        self.check(to)?;
        if !self.nodes[from.0].next.contains(&to) {
            self.nodes[from.0].next.push(to);
            self.nodes[to.0].prev_count += 1;
        }
        Ok(())
    }

    /// Connect consecutive nodes.
    pub fn chain(&mut self, ids: &[NodeId]) -> Result<(), ConfigError> {
        for pair in ids.windows(2) {
            self.connect(pair[0], pair[1])?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(Node::name)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(Node::next).unwrap_or(&[])
    }

    pub fn population(&self, id: NodeId) -> Option<&Population> {
        self.node(id).and_then(Node::population)
    }

    pub fn fitness(&self, id: NodeId) -> Option<&[f64]> {
        self.node(id).and_then(Node::fitness)
    }

    pub fn context(&self, id: NodeId) -> Option<&Context> {
        self.node(id).and_then(Node::context)
    }

    /// Nodes that can produce an initial population.
    pub fn sources(&self) -> Vec<NodeId> {
        self.ids()
            .filter(|id| self.nodes[id.0].kind.is_source())
            .collect()
    }

    /// Check that the graph is acyclic, names are unique and every node lies
    /// on a path from `entry` to `exit`. Nodes on no such path and unreachable
    /// from both ends only produce a warning.
    pub fn validate(&self, entry: NodeId, exit: NodeId) -> Result<(), ConfigError> {
        self.check(entry)?;
        self.check(exit)?;

        if let Some(id) = self.find_cycle() {
            return Err(ConfigError::Cycle(self.nodes[id.0].name.clone()));
        }

        let mut names = HashSet::new();
        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(ConfigError::DuplicateLayer(node.name.clone()));
            }
        }

        let forward = self.reachable(entry, |node, _| node.next.clone());
        let predecessors = self.predecessors();
        let backward = self.reachable(exit, |_, id| predecessors[id.0].clone());

        for (i, node) in self.nodes.iter().enumerate() {
            match (forward[i], backward[i]) {
                (true, true) => {}
                (false, false) => {
                    log::warn!("Layer `{}` is not connected to the pipeline", node.name)
                }
                _ => return Err(ConfigError::Disconnected(node.name.clone())),
            }
        }
        Ok(())
    }

    fn find_cycle(&self) -> Option<NodeId> {
        let mut marks = vec![Mark::New; self.nodes.len()];
        (0..self.nodes.len()).find_map(|start| {
            if marks[start] == Mark::New {
                self.visit_for_cycle(start, &mut marks)
            } else {
                None
            }
        })
    }

    fn visit_for_cycle(&self, index: usize, marks: &mut [Mark]) -> Option<NodeId> {
        marks[index] = Mark::Active;
        for &next in &self.nodes[index].next {
            match marks[next.0] {
                Mark::Active => return Some(next),
                Mark::New => {
                    if let Some(found) = self.visit_for_cycle(next.0, marks) {
                        return Some(found);
                    }
                }
                Mark::Done => {}
            }
        }
        marks[index] = Mark::Done;
        None
    }

    fn predecessors(&self) -> Vec<Vec<NodeId>> {
        let mut predecessors = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for next in &node.next {
                predecessors[next.0].push(NodeId(i));
            }
        }
        predecessors
    }

    fn reachable(&self, start: NodeId, edges: impl Fn(&Node, NodeId) -> Vec<NodeId>) -> Vec<bool> {
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([start]);
        seen[start.0] = true;
        while let Some(id) = queue.pop_front() {
            for next in edges(&self.nodes[id.0], id) {
                if !seen[next.0] {
                    seen[next.0] = true;
                    queue.push_back(next);
                }
            }
        }
        seen
    }

    /// Forget snapshots and partially filled barriers.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.population = None;
            node.fitness = None;
            node.context = None;
            if let NodeKind::Barrier(barrier) = &mut node.kind {
                barrier.reset();
            }
        }
    }

    /// Depth-first traversal starting at `entry`.
    pub fn run(
        &mut self,
        entry: NodeId,
        population: Option<Population>,
        fitness: Option<Vec<f64>>,
        context: Context,
    ) -> Result<(), PipelineError> {
        self.check(entry)?;
        self.visit(entry, population, fitness, context)
    }

    fn visit(
        &mut self,
        id: NodeId,
        population: Option<Population>,
        fitness: Option<Vec<f64>>,
        mut context: Context,
    ) -> Result<(), PipelineError> {
        let fitness = match (&population, fitness) {
            (Some(p), Some(f)) if f.len() != p.len() => {
                return Err(PipelineError::FitnessLength {
                    expected: p.len(),
                    actual: f.len(),
                });
            }
            (Some(p), None) => Some(vec![0.0; p.len()]),
            (_, fitness) => fitness,
        };

        let node = &mut self.nodes[id.0];
        let expected = node.prev_count.max(1);

        let (population, fitness) = match &mut node.kind {
            NodeKind::Barrier(barrier) => match barrier.arrive(population, fitness, expected)? {
                Some(merged) => {
                    context.set_sorted(false);
                    merged
                }
                None => {
                    node.context = Some(context);
                    return Ok(());
                }
            },
            NodeKind::Source(source) if population.is_none() => {
                let initial = source.produce_initial(&context)?;
                let fitness = vec![0.0; initial.len()];
                (Some(initial), Some(fitness))
            }
            kind => match (population, fitness) {
                (Some(population), Some(fitness)) if !context.block_all() => {
                    let (population, fitness) = kind.process(population, fitness, &mut context)?;
                    if population.len() != fitness.len() {
                        return Err(PipelineError::FitnessLength {
                            expected: population.len(),
                            actual: fitness.len(),
                        });
                    }
                    (Some(population), Some(fitness))
                }
                passthrough => passthrough,
            },
        };

        self.send_next(id, population, fitness, context)
    }

    fn send_next(
        &mut self,
        id: NodeId,
        population: Option<Population>,
        fitness: Option<Vec<f64>>,
        context: Context,
    ) -> Result<(), PipelineError> {
        let node = &mut self.nodes[id.0];
        node.population = population.clone();
        node.fitness = fitness.clone();
        node.context = Some(context.clone());

        let next = node.next.clone();
        match next.as_slice() {
            [] => Ok(()),
            [single] => self.visit(*single, population, fitness, context),
            many => {
                for &successor in many {
                    self.visit(successor, population.clone(), fitness.clone(), context.clone())?;
                }
                Ok(())
            }
        }
    }
}
