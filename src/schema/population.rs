//! Population storage.
//!
//! Populations are stored column-wise: one [`Chromosome`] per record field,
//! each holding `len * width` genes. Chromosomes sit behind `Arc` so copying a
//! population between layers is shallow; writes go through `Arc::make_mut`.

use std::ops::Range;
use std::sync::Arc;

use super::{GeneType, RecordType};

/// Gene storage of one chromosome across all individuals.
#[derive(Debug, Clone, PartialEq)]
pub enum Genes {
    Float(Vec<f64>),
    Integer(Vec<i64>),
    Boolean(Vec<bool>),
}

impl Genes {
    pub fn gene_type(&self) -> GeneType {
        match self {
            Genes::Float(_) => GeneType::Float,
            Genes::Integer(_) => GeneType::Integer,
            Genes::Boolean(_) => GeneType::Boolean,
        }
    }

    fn len(&self) -> usize {
        match self {
            Genes::Float(v) => v.len(),
            Genes::Integer(v) => v.len(),
            Genes::Boolean(v) => v.len(),
        }
    }

    fn zeros(gene_type: GeneType, n: usize) -> Self {
        match gene_type {
            GeneType::Float => Genes::Float(vec![0.0; n]),
            GeneType::Integer => Genes::Integer(vec![0; n]),
            GeneType::Boolean => Genes::Boolean(vec![false; n]),
        }
    }
}

/// One chromosome for every individual of a population, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Chromosome {
    width: usize,
    genes: Genes,
}

impl Chromosome {
    /// `genes` must hold a whole number of rows of `width` genes.
    pub fn new(width: usize, genes: Genes) -> Option<Self> {
        if width == 0 || genes.len() % width != 0 {
            return None;
        }
        Some(Self { width, genes })
    }

    pub fn zeros(gene_type: GeneType, rows: usize, width: usize) -> Self {
        Self {
            width,
            genes: Genes::zeros(gene_type, rows * width),
        }
    }

    pub fn from_f64_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let width = rows.first()?.len();
        if rows.iter().any(|r| r.len() != width) {
            return None;
        }
        Self::new(width, Genes::Float(rows.concat()))
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.genes.len() / self.width
    }

    pub fn gene_type(&self) -> GeneType {
        self.genes.gene_type()
    }

    pub fn genes(&self) -> &Genes {
        &self.genes
    }

    pub fn genes_mut(&mut self) -> &mut Genes {
        &mut self.genes
    }

    /// Float genes of row `i`.
    pub fn float_row(&self, i: usize) -> Option<&[f64]> {
        match &self.genes {
            Genes::Float(v) => v.get(i * self.width..(i + 1) * self.width),
            _ => None,
        }
    }

    pub fn integer_row(&self, i: usize) -> Option<&[i64]> {
        match &self.genes {
            Genes::Integer(v) => v.get(i * self.width..(i + 1) * self.width),
            _ => None,
        }
    }

    pub fn boolean_row(&self, i: usize) -> Option<&[bool]> {
        match &self.genes {
            Genes::Boolean(v) => v.get(i * self.width..(i + 1) * self.width),
            _ => None,
        }
    }

    /// Row-wise gene sums as floats (booleans count as 1).
    pub fn row_sums(&self) -> Vec<f64> {
        let w = self.width;
        match &self.genes {
            Genes::Float(v) => v.chunks(w).map(|r| r.iter().sum()).collect(),
            Genes::Integer(v) => v.chunks(w).map(|r| r.iter().sum::<i64>() as f64).collect(),
            Genes::Boolean(v) => v
                .chunks(w)
                .map(|r| r.iter().filter(|b| **b).count() as f64)
                .collect(),
        }
    }

    /// Gather rows by index, repetitions allowed.
    pub fn select(&self, indices: &[usize]) -> Self {
        let w = self.width;
        let genes = match &self.genes {
            Genes::Float(v) => Genes::Float(gather(v, w, indices)),
            Genes::Integer(v) => Genes::Integer(gather(v, w, indices)),
            Genes::Boolean(v) => Genes::Boolean(gather(v, w, indices)),
        };
        Self { width: w, genes }
    }

    pub fn slice(&self, rows: Range<usize>) -> Self {
        let span = rows.start * self.width..rows.end * self.width;
        let genes = match &self.genes {
            Genes::Float(v) => Genes::Float(v[span].to_vec()),
            Genes::Integer(v) => Genes::Integer(v[span].to_vec()),
            Genes::Boolean(v) => Genes::Boolean(v[span].to_vec()),
        };
        Self {
            width: self.width,
            genes,
        }
    }

    /// Append the rows of `other`. Returns `false` on a layout mismatch.
    pub fn append(&mut self, other: &Chromosome) -> bool {
        if self.width != other.width {
            return false;
        }
        match (&mut self.genes, &other.genes) {
            (Genes::Float(a), Genes::Float(b)) => a.extend_from_slice(b),
            (Genes::Integer(a), Genes::Integer(b)) => a.extend_from_slice(b),
            (Genes::Boolean(a), Genes::Boolean(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }

    /// Canonical bytes of row `i`, floats optionally rounded.
    fn write_key(&self, i: usize, max_decimals: Option<u32>, out: &mut Vec<u8>) {
        let span = i * self.width..(i + 1) * self.width;
        match &self.genes {
            Genes::Float(v) => {
                for &x in &v[span] {
                    out.extend_from_slice(&canonical_float(x, max_decimals).to_le_bytes());
                }
            }
            Genes::Integer(v) => {
                for &x in &v[span] {
                    out.extend_from_slice(&x.to_le_bytes());
                }
            }
            Genes::Boolean(v) => out.extend(v[span].iter().map(|&b| b as u8)),
        }
    }
}

fn gather<T: Copy>(data: &[T], width: usize, indices: &[usize]) -> Vec<T> {
    let mut out = Vec::with_capacity(indices.len() * width);
    for &i in indices {
        out.extend_from_slice(&data[i * width..(i + 1) * width]);
    }
    out
}

/// Bit pattern used for every NaN in cache keys.
const CANONICAL_NAN_BITS: u64 = 0x7ff8_0000_0000_0000;

fn canonical_float(x: f64, max_decimals: Option<u32>) -> u64 {
    if x.is_nan() {
        return CANONICAL_NAN_BITS;
    }
    let x = match max_decimals {
        Some(d) if x.is_finite() => {
            let scale = 10f64.powi(d as i32);
            let rounded = (x * scale).round() / scale;
            if rounded.is_finite() { rounded } else { x }
        }
        _ => x,
    };
    // Collapse -0.0 onto 0.0.
    if x == 0.0 { 0u64 } else { x.to_bits() }
}

/// Errors raised when assembling populations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PopulationError {
    #[error("Population schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("Chromosome `{0}` is not part of the record type")]
    UnknownChromosome(String),
}

/// Ordered, homogeneous set of individuals.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    record: Arc<RecordType>,
    len: usize,
    chromosomes: Vec<Arc<Chromosome>>,
}

impl Population {
    /// Assemble from one chromosome per record field, in field order.
    pub fn new(record: Arc<RecordType>, chromosomes: Vec<Chromosome>) -> Result<Self, PopulationError> {
        if chromosomes.len() != record.len() {
            return Err(PopulationError::SchemaMismatch(format!(
                "expected {} chromosomes, got {}",
                record.len(),
                chromosomes.len()
            )));
        }
        let len = chromosomes.first().map(Chromosome::rows).unwrap_or(0);
        for (field, chromosome) in record.fields().iter().zip(&chromosomes) {
            if field.gene_type != chromosome.gene_type()
                || field.width() != chromosome.width()
                || chromosome.rows() != len
            {
                return Err(PopulationError::SchemaMismatch(format!(
                    "chromosome `{}` does not match its field layout",
                    field.name
                )));
            }
        }
        Ok(Self {
            record,
            len,
            chromosomes: chromosomes.into_iter().map(Arc::new).collect(),
        })
    }

    /// `len` individuals with every gene zeroed.
    pub fn zeros(record: Arc<RecordType>, len: usize) -> Self {
        let chromosomes = record
            .fields()
            .iter()
            .map(|f| Arc::new(Chromosome::zeros(f.gene_type, len, f.width())))
            .collect();
        Self {
            record,
            len,
            chromosomes,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record
    }

    pub fn chromosome(&self, name: &str) -> Option<&Chromosome> {
        self.record
            .index_of(name)
            .map(|i| self.chromosomes[i].as_ref())
    }

    pub fn chromosome_at(&self, index: usize) -> &Chromosome {
        &self.chromosomes[index]
    }

    /// Mutable access, copying the chromosome if it is shared.
    pub fn chromosome_mut(&mut self, name: &str) -> Option<&mut Chromosome> {
        let index = self.record.index_of(name)?;
        Some(Arc::make_mut(&mut self.chromosomes[index]))
    }

    /// Replace a chromosome; the layout and row count must match.
    pub fn set_chromosome(&mut self, name: &str, chromosome: Chromosome) -> Result<(), PopulationError> {
        let index = self
            .record
            .index_of(name)
            .ok_or_else(|| PopulationError::UnknownChromosome(name.to_string()))?;
        let field = &self.record.fields()[index];
        if field.gene_type != chromosome.gene_type()
            || field.width() != chromosome.width()
            || chromosome.rows() != self.len
        {
            return Err(PopulationError::SchemaMismatch(format!(
                "replacement for `{}` has {} rows of {} {:?} genes, expected {} rows of {} {:?}",
                name,
                chromosome.rows(),
                chromosome.width(),
                chromosome.gene_type(),
                self.len,
                field.width(),
                field.gene_type
            )));
        }
        self.chromosomes[index] = Arc::new(chromosome);
        Ok(())
    }

    /// Individuals at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            record: Arc::clone(&self.record),
            len: indices.len(),
            chromosomes: self
                .chromosomes
                .iter()
                .map(|c| Arc::new(c.select(indices)))
                .collect(),
        }
    }

    pub fn slice(&self, rows: Range<usize>) -> Self {
        let rows = rows.start.min(self.len)..rows.end.min(self.len);
        Self {
            record: Arc::clone(&self.record),
            len: rows.len(),
            chromosomes: self
                .chromosomes
                .iter()
                .map(|c| Arc::new(c.slice(rows.clone())))
                .collect(),
        }
    }

    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            *self = self.slice(0..len);
        }
    }

    /// Append the individuals of `other`.
    pub fn concat(&mut self, other: &Population) -> Result<(), PopulationError> {
        if self.record != other.record {
            return Err(PopulationError::SchemaMismatch(
                "cannot concatenate populations of different record types".to_string(),
            ));
        }
        for (mine, theirs) in self.chromosomes.iter_mut().zip(&other.chromosomes) {
            Arc::make_mut(mine).append(theirs);
        }
        self.len += other.len;
        Ok(())
    }

    /// Canonical byte key of individual `i`.
    ///
    /// Fields are written in record order. Floats are rounded to
    /// `max_decimals` when given, every NaN shares one bit pattern and `-0.0`
    /// is written as `0.0`.
    pub fn individual_key(&self, i: usize, max_decimals: Option<u32>) -> Vec<u8> {
        let mut key = Vec::new();
        for chromosome in &self.chromosomes {
            chromosome.write_key(i, max_decimals, &mut key);
        }
        key
    }
}
