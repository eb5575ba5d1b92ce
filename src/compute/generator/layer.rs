//! Layer extension points and the closed set of node kinds.

use std::fmt;

use crate::schema::{Chromosome, Parameters, Population};

use super::{
    BinaryMutationLayer, Block, CombineLayer, Concatenate, Context, FilterFirsts, FirstGenLayer,
    NumericMutationLayer, PipelineError, RandomPredation, Sort,
};

/// A pipeline stage transforming a whole population.
pub trait Layer: Send {
    /// Kind name, used as the prefix of generated node names.
    fn kind(&self) -> &'static str;

    fn parameters(&self) -> &Parameters;

    fn parameters_mut(&mut self) -> &mut Parameters;

    /// Transform `population` and its aligned `fitness`.
    fn call(
        &mut self,
        population: Population,
        fitness: Vec<f64>,
        context: &mut Context,
    ) -> Result<(Population, Vec<f64>), PipelineError>;
}

/// A pipeline stage applied chromosome by chromosome.
pub trait ChromosomeOperator: Send {
    fn kind(&self) -> &'static str;

    fn parameters(&self) -> &Parameters;

    fn parameters_mut(&mut self) -> &mut Parameters;

    /// Chromosomes this operator was restricted to, if any.
    fn chromosome_names(&self) -> Option<&[String]>;

    /// Produce the replacement for one chromosome. `name` is `None` in
    /// single-chromosome mode.
    fn call_chromosome(
        &mut self,
        chromosome: &Chromosome,
        fitness: &[f64],
        context: &mut Context,
        name: Option<&str>,
    ) -> Result<Chromosome, PipelineError>;
}

/// Run `operator` over the chromosomes it targets.
///
/// With explicit names only those are visited. Without names a
/// single-chromosome record is handled as one unnamed buffer unless a block
/// flag is set; otherwise every unblocked chromosome is visited.
pub fn apply_chromosome_operator<O: ChromosomeOperator + ?Sized>(
    operator: &mut O,
    mut population: Population,
    fitness: Vec<f64>,
    context: &mut Context,
) -> Result<(Population, Vec<f64>), PipelineError> {
    let targets: Vec<String> = match operator.chromosome_names() {
        Some(names) => names.to_vec(),
        None if population.record_type().len() == 1 && !context.any_blocked() => {
            let replacement =
                operator.call_chromosome(population.chromosome_at(0), &fitness, context, None)?;
            let name = population.record_type().fields()[0].name.clone();
            population.set_chromosome(&name, replacement)?;
            return Ok((population, fitness));
        }
        None => population.record_type().names().map(str::to_string).collect(),
    };

    for name in targets {
        if context.is_blocked(&name) {
            continue;
        }
        let chromosome = population
            .chromosome(&name)
            .ok_or_else(|| PipelineError::UnknownChromosome(name.clone()))?;
        let replacement = operator.call_chromosome(chromosome, &fitness, context, Some(&name))?;
        population.set_chromosome(&name, replacement)?;
    }

    Ok((population, fitness))
}

/// Node variants of the layer graph.
pub enum NodeKind {
    /// Whole-population transform.
    Pipe(Box<dyn Layer>),
    /// Per-chromosome transform.
    Chromosome(Box<dyn ChromosomeOperator>),
    /// Fan-in barrier.
    Barrier(Concatenate),
    /// Producer of the initial population.
    Source(FirstGenLayer),
}

impl NodeKind {
    pub fn pipe(layer: impl Layer + 'static) -> Self {
        NodeKind::Pipe(Box::new(layer))
    }

    pub fn chromosome(operator: impl ChromosomeOperator + 'static) -> Self {
        NodeKind::Chromosome(Box::new(operator))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NodeKind::Pipe(layer) => layer.kind(),
            NodeKind::Chromosome(op) => op.kind(),
            NodeKind::Barrier(_) => "Concatenate",
            NodeKind::Source(_) => "FirstGenLayer",
        }
    }

    pub fn parameters(&self) -> &Parameters {
        match self {
            NodeKind::Pipe(layer) => layer.parameters(),
            NodeKind::Chromosome(op) => op.parameters(),
            NodeKind::Barrier(barrier) => barrier.parameters(),
            NodeKind::Source(source) => source.parameters(),
        }
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        match self {
            NodeKind::Pipe(layer) => layer.parameters_mut(),
            NodeKind::Chromosome(op) => op.parameters_mut(),
            NodeKind::Barrier(barrier) => barrier.parameters_mut(),
            NodeKind::Source(source) => source.parameters_mut(),
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, NodeKind::Source(_))
    }

    /// Apply the node's transform to a present population.
    pub fn process(
        &mut self,
        population: Population,
        fitness: Vec<f64>,
        context: &mut Context,
    ) -> Result<(Population, Vec<f64>), PipelineError> {
        match self {
            NodeKind::Pipe(layer) => layer.call(population, fitness, context),
            NodeKind::Chromosome(op) => {
                apply_chromosome_operator(op.as_mut(), population, fitness, context)
            }
            NodeKind::Barrier(_) => Ok((population, fitness)),
            NodeKind::Source(source) => source.process(population, fitness, context),
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeKind")
            .field("kind", &self.kind())
            .field("parameters", self.parameters())
            .finish()
    }
}

macro_rules! node_kind_from {
    ($variant:ident: $($ty:ty),+) => {
        $(
            impl From<$ty> for NodeKind {
                fn from(value: $ty) -> Self {
                    NodeKind::$variant(Box::new(value))
                }
            }
        )+
    };
}

node_kind_from!(Pipe: Sort, FilterFirsts, Block, RandomPredation);
node_kind_from!(Chromosome: CombineLayer, NumericMutationLayer, BinaryMutationLayer);

impl From<Concatenate> for NodeKind {
    fn from(value: Concatenate) -> Self {
        NodeKind::Barrier(value)
    }
}

impl From<FirstGenLayer> for NodeKind {
    fn from(value: FirstGenLayer) -> Self {
        NodeKind::Source(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ChromosomeSpec, Descriptor, GeneType, Genes};

    /// Adds one to every float gene and records which names it saw.
    struct Increment {
        parameters: Parameters,
        names: Option<Vec<String>>,
        seen: Vec<Option<String>>,
    }

    impl Increment {
        fn new(names: Option<Vec<String>>) -> Self {
            Self {
                parameters: Parameters::new(),
                names,
                seen: Vec::new(),
            }
        }
    }

    impl ChromosomeOperator for Increment {
        fn kind(&self) -> &'static str {
            "Increment"
        }

        fn parameters(&self) -> &Parameters {
            &self.parameters
        }

        fn parameters_mut(&mut self) -> &mut Parameters {
            &mut self.parameters
        }

        fn chromosome_names(&self) -> Option<&[String]> {
            self.names.as_deref()
        }

        fn call_chromosome(
            &mut self,
            chromosome: &Chromosome,
            _fitness: &[f64],
            _context: &mut Context,
            name: Option<&str>,
        ) -> Result<Chromosome, PipelineError> {
            self.seen.push(name.map(str::to_string));
            let mut out = chromosome.clone();
            if let Genes::Float(v) = out.genes_mut() {
                v.iter_mut().for_each(|x| *x += 1.0);
            }
            Ok(out)
        }
    }

    fn two_field_population() -> (Population, Context) {
        let descriptor = Descriptor::from_specs(vec![
            ChromosomeSpec::float("a", 2),
            ChromosomeSpec::float("b", 1),
        ])
        .unwrap();
        let population = Population::zeros(descriptor.record_type(), 3);
        let context = Context::new(3, descriptor.chromosome_names());
        (population, context)
    }

    #[test]
    fn test_single_chromosome_mode() {
        let descriptor = Descriptor::single(2, GeneType::Float).unwrap();
        let population = Population::zeros(descriptor.record_type(), 2);
        let mut context = Context::new(2, descriptor.chromosome_names());
        let mut op = Increment::new(None);

        let (out, _) =
            apply_chromosome_operator(&mut op, population, vec![0.0; 2], &mut context).unwrap();
        assert_eq!(op.seen, vec![None]);
        assert_eq!(out.chromosome("chr0").unwrap().row_sums(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_every_unblocked_chromosome() {
        let (population, mut context) = two_field_population();
        context.block("a").unwrap();
        let mut op = Increment::new(None);

        let (out, _) =
            apply_chromosome_operator(&mut op, population, vec![0.0; 3], &mut context).unwrap();
        assert_eq!(op.seen, vec![Some("b".to_string())]);
        assert_eq!(out.chromosome("a").unwrap().row_sums(), vec![0.0; 3]);
        assert_eq!(out.chromosome("b").unwrap().row_sums(), vec![1.0; 3]);
    }

    #[test]
    fn test_explicit_names() {
        let (population, mut context) = two_field_population();
        let mut op = Increment::new(Some(vec!["b".to_string()]));

        apply_chromosome_operator(&mut op, population.clone(), vec![0.0; 3], &mut context)
            .unwrap();
        assert_eq!(op.seen, vec![Some("b".to_string())]);

        let mut missing = Increment::new(Some(vec!["z".to_string()]));
        assert!(matches!(
            apply_chromosome_operator(&mut missing, population, vec![0.0; 3], &mut context),
            Err(PipelineError::UnknownChromosome(_))
        ));
    }

    #[test]
    fn test_custom_node_kind() {
        let node = NodeKind::chromosome(Increment::new(None));
        assert_eq!(node.kind(), "Increment");
        assert!(!node.is_source());
    }
}
