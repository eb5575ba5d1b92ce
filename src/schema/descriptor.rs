//! Individual record schema.
//!
//! A [`Descriptor`] declares the named chromosomes of an individual: element
//! shape, gene type and value range. It produces the [`RecordType`] every
//! population built from it conforms to.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Element type of a chromosome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GeneType {
    #[default]
    Float,
    Integer,
    Boolean,
}

impl GeneType {
    /// Range used when none is given.
    pub fn default_range(&self) -> (f64, f64) {
        match self {
            GeneType::Float => (0.0, 1.0),
            GeneType::Integer => (0.0, 10.0),
            GeneType::Boolean => (0.0, 1.0),
        }
    }
}

/// One chromosome of the record schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChromosomeSpec {
    pub name: String,
    /// Element shape; the stored row width is the product of the dimensions.
    pub shape: Vec<usize>,
    pub gene_type: GeneType,
    pub range: (f64, f64),
}

impl ChromosomeSpec {
    pub fn new(name: impl Into<String>, size: usize, gene_type: GeneType) -> Self {
        Self {
            name: name.into(),
            shape: vec![size],
            gene_type,
            range: gene_type.default_range(),
        }
    }

    pub fn float(name: impl Into<String>, size: usize) -> Self {
        Self::new(name, size, GeneType::Float)
    }

    pub fn integer(name: impl Into<String>, size: usize) -> Self {
        Self::new(name, size, GeneType::Integer)
    }

    pub fn boolean(name: impl Into<String>, size: usize) -> Self {
        Self::new(name, size, GeneType::Boolean)
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = (min, max);
        self
    }

    pub fn with_shape(mut self, shape: Vec<usize>) -> Self {
        self.shape = shape;
        self
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Field of the structural record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
    pub name: String,
    pub gene_type: GeneType,
    pub shape: Vec<usize>,
}

impl FieldType {
    #[inline]
    pub fn width(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Structural record type shared by every individual of a population.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordType {
    fields: Vec<FieldType>,
}

impl RecordType {
    pub fn fields(&self) -> &[FieldType] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Record schema of an individual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ChromosomeSpec>", into = "Vec<ChromosomeSpec>")]
pub struct Descriptor {
    chromosomes: Vec<ChromosomeSpec>,
    record: Arc<RecordType>,
}

impl Descriptor {
    /// Build from parallel lists.
    ///
    /// `types` of length one applies to every chromosome. Shorter `ranges`,
    /// `types` and `names` are completed with defaults (type range, `Float`,
    /// `chr{i}`); lists longer than `sizes` are rejected.
    pub fn new(
        sizes: Vec<Vec<usize>>,
        ranges: Vec<Option<(f64, f64)>>,
        types: Vec<GeneType>,
        names: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let n = sizes.len();
        for (what, got) in [
            ("ranges", ranges.len()),
            ("types", types.len()),
            ("names", names.len()),
        ] {
            if got > n {
                return Err(ConfigError::DescriptorMismatch {
                    what,
                    got,
                    expected: n,
                });
            }
        }

        let specs = sizes
            .into_iter()
            .enumerate()
            .map(|(i, shape)| {
                let gene_type = match types.len() {
                    1 => types[0],
                    _ => types.get(i).copied().unwrap_or_default(),
                };
                let name = names.get(i).cloned().unwrap_or_else(|| format!("chr{}", i));
                let range = ranges
                    .get(i)
                    .copied()
                    .flatten()
                    .unwrap_or_else(|| gene_type.default_range());
                ChromosomeSpec {
                    name,
                    shape,
                    gene_type,
                    range,
                }
            })
            .collect();

        Self::from_specs(specs)
    }

    /// Single chromosome named `chr0`.
    pub fn single(size: usize, gene_type: GeneType) -> Result<Self, ConfigError> {
        Self::from_specs(vec![ChromosomeSpec::new("chr0", size, gene_type)])
    }

    pub fn from_specs(chromosomes: Vec<ChromosomeSpec>) -> Result<Self, ConfigError> {
        if chromosomes.is_empty() {
            return Err(ConfigError::EmptyDescriptor);
        }

        let mut seen = HashSet::new();
        for spec in &chromosomes {
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateChromosome(spec.name.clone()));
            }
            if spec.shape.is_empty() || spec.shape.contains(&0) {
                return Err(ConfigError::InvalidShape(spec.name.clone()));
            }
            if spec.range.0 > spec.range.1 {
                return Err(ConfigError::InvalidRange {
                    name: spec.name.clone(),
                    min: spec.range.0,
                    max: spec.range.1,
                });
            }
        }

        let record = RecordType {
            fields: chromosomes
                .iter()
                .map(|spec| FieldType {
                    name: spec.name.clone(),
                    gene_type: spec.gene_type,
                    shape: spec.shape.clone(),
                })
                .collect(),
        };

        Ok(Self {
            chromosomes,
            record: Arc::new(record),
        })
    }

    /// The structural record type ("dtype").
    pub fn record_type(&self) -> Arc<RecordType> {
        Arc::clone(&self.record)
    }

    pub fn chromosomes(&self) -> &[ChromosomeSpec] {
        &self.chromosomes
    }

    pub fn spec(&self, name: &str) -> Option<&ChromosomeSpec> {
        self.chromosomes.iter().find(|c| c.name == name)
    }

    pub fn chromosome_names(&self) -> Vec<String> {
        self.chromosomes.iter().map(|c| c.name.clone()).collect()
    }

    pub fn chromosome_ranges(&self) -> Vec<(f64, f64)> {
        self.chromosomes.iter().map(|c| c.range).collect()
    }

    pub fn len(&self) -> usize {
        self.chromosomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chromosomes.is_empty()
    }
}

impl Default for Descriptor {
    /// One float chromosome with a single gene.
    fn default() -> Self {
        let spec = ChromosomeSpec::float("chr0", 1);
        let record = RecordType {
            fields: vec![FieldType {
                name: spec.name.clone(),
                gene_type: spec.gene_type,
                shape: spec.shape.clone(),
            }],
        };
        Self {
            chromosomes: vec![spec],
            record: Arc::new(record),
        }
    }
}

impl TryFrom<Vec<ChromosomeSpec>> for Descriptor {
    type Error = ConfigError;

    fn try_from(specs: Vec<ChromosomeSpec>) -> Result<Self, Self::Error> {
        Self::from_specs(specs)
    }
}

impl From<Descriptor> for Vec<ChromosomeSpec> {
    fn from(descriptor: Descriptor) -> Self {
        descriptor.chromosomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let descriptor = Descriptor::new(vec![vec![5]], vec![], vec![], vec![]).unwrap();
        let spec = &descriptor.chromosomes()[0];
        assert_eq!(spec.name, "chr0");
        assert_eq!(spec.gene_type, GeneType::Float);
        assert_eq!(spec.range, (0.0, 1.0));
        assert_eq!(spec.width(), 5);
    }

    #[test]
    fn test_type_defaults_ranges() {
        let descriptor = Descriptor::new(
            vec![vec![2], vec![3], vec![4]],
            vec![None, Some((-5.0, 5.0))],
            vec![GeneType::Integer, GeneType::Float, GeneType::Boolean],
            vec!["a".to_string()],
        )
        .unwrap();

        assert_eq!(
            descriptor.chromosome_names(),
            vec!["a".to_string(), "chr1".to_string(), "chr2".to_string()]
        );
        assert_eq!(
            descriptor.chromosome_ranges(),
            vec![(0.0, 10.0), (-5.0, 5.0), (0.0, 1.0)]
        );
    }

    #[test]
    fn test_single_type_broadcasts() {
        let descriptor =
            Descriptor::new(vec![vec![2], vec![3]], vec![], vec![GeneType::Boolean], vec![])
                .unwrap();
        assert!(
            descriptor
                .chromosomes()
                .iter()
                .all(|c| c.gene_type == GeneType::Boolean)
        );
    }

    #[test]
    fn test_mismatch_rejected() {
        let result = Descriptor::new(
            vec![vec![2]],
            vec![],
            vec![],
            vec!["a".to_string(), "b".to_string()],
        );
        assert_eq!(
            result,
            Err(ConfigError::DescriptorMismatch {
                what: "names",
                got: 2,
                expected: 1
            })
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = Descriptor::from_specs(vec![
            ChromosomeSpec::float("x", 2),
            ChromosomeSpec::integer("x", 2),
        ]);
        assert_eq!(result, Err(ConfigError::DuplicateChromosome("x".to_string())));
    }

    #[test]
    fn test_invalid_shape_and_range() {
        assert!(matches!(
            Descriptor::single(0, GeneType::Float),
            Err(ConfigError::InvalidShape(_))
        ));
        assert!(matches!(
            Descriptor::from_specs(vec![ChromosomeSpec::float("x", 1).with_range(2.0, 1.0)]),
            Err(ConfigError::InvalidRange { .. })
        ));
        assert_eq!(
            Descriptor::from_specs(vec![]),
            Err(ConfigError::EmptyDescriptor)
        );
    }

    #[test]
    fn test_record_type() {
        let descriptor = Descriptor::from_specs(vec![
            ChromosomeSpec::float("weights", 0).with_shape(vec![2, 3]),
            ChromosomeSpec::boolean("mask", 4),
        ])
        .unwrap();
        let record = descriptor.record_type();
        assert_eq!(record.len(), 2);
        assert_eq!(record.field("weights").unwrap().width(), 6);
        assert_eq!(record.index_of("mask"), Some(1));
    }

    #[test]
    fn test_serialization() {
        let descriptor = Descriptor::from_specs(vec![
            ChromosomeSpec::float("x", 3).with_range(-1.0, 1.0),
            ChromosomeSpec::integer("y", 2),
        ])
        .unwrap();
        let json = serde_json::to_string(&descriptor).unwrap();
        let parsed: Descriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, descriptor);
        assert_eq!(parsed.record_type(), descriptor.record_type());
    }
}
