//! Matrix-vector kernel families.

use crate::config::{Configuration, MatvecProblem, Shape};
use crate::utils::validate_matvec_inputs;
use anyhow::{ensure, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;
use std::sync::Arc;

pub const DEFAULT_VECTOR_WIDTH: usize = 4;
pub const DEFAULT_MAX_BLOCK_HEIGHT: usize = 16;

/// Inner-loop unroll factors addressed by the extra parameter.
pub const UNROLL_FACTORS: [usize; 4] = [1, 2, 4, 8];

const MAX_LANES: usize = 16;

pub struct MatvecInputs<'a> {
    pub matrix: ArrayView2<'a, f32>,
    pub x: ArrayView1<'a, f32>,
    /// Accumulator input for the generalized form; ignored by plain matvec.
    pub y: Option<ArrayView1<'a, f32>>,
    pub alpha: f32,
    pub beta: f32,
}

impl<'a> MatvecInputs<'a> {
    pub fn new(matrix: ArrayView2<'a, f32>, x: ArrayView1<'a, f32>) -> Self {
        Self {
            matrix,
            x,
            y: None,
            alpha: 1.0,
            beta: 0.0,
        }
    }

    pub fn with_accumulator(mut self, y: ArrayView1<'a, f32>, alpha: f32, beta: f32) -> Self {
        self.y = Some(y);
        self.alpha = alpha;
        self.beta = beta;
        self
    }
}

pub trait MatvecKernel: Send + Sync {
    fn name(&self) -> &'static str;
    fn vector_width(&self) -> usize;
    fn max_block_height(&self) -> usize;
    /// Size of the extra-parameter domain.
    fn total_variations(&self) -> usize;
    /// Family-specific constraints on top of the device rules.
    fn supports(&self, problem: &MatvecProblem, shape: &Shape) -> bool;
    fn run(&self, config: &Configuration, inputs: &MatvecInputs<'_>) -> Result<Array1<f32>>;
    /// Straightforward result used for correctness checks.
    fn reference(&self, problem: &MatvecProblem, inputs: &MatvecInputs<'_>) -> Result<Array1<f32>>;
}

pub type DynMatvecKernel = Arc<dyn MatvecKernel>;

/// How a dispatch walks one output row.
#[derive(Debug, Clone, Copy)]
struct StripPlan {
    /// Columns consumed per strip.
    step: usize,
    /// Lane accumulators per strip; 1 without the vector hint.
    lanes: usize,
    /// Factor applied to every finished strip.
    strip_scale: f32,
}

fn unroll_divides(problem: &MatvecProblem, shape: &Shape, vector_width: usize, unroll: usize) -> bool {
    let strip = shape.group_size * vector_width;
    strip > 0 && problem.n % strip == 0 && (problem.n / strip) % unroll == 0
}

fn dispatch(config: &Configuration, inputs: &MatvecInputs<'_>, plan: StripPlan) -> Result<Vec<f32>> {
    let problem = config.problem;
    validate_matvec_inputs(&problem, inputs)?;

    let rows_per_group = config.group_size() * config.block_height();
    ensure!(rows_per_group > 0, "empty work group in {:?}", config.shape);
    ensure!(
        problem.m % rows_per_group == 0,
        "{} rows are not covered by groups of {}",
        problem.m,
        rows_per_group
    );
    ensure!(
        plan.step > 0 && problem.n % plan.step == 0,
        "{} columns are not covered by strips of {}",
        problem.n,
        plan.step
    );

    let mut output = vec![0.0f32; problem.m];
    output
        .par_chunks_mut(rows_per_group)
        .enumerate()
        .for_each(|(group, rows)| {
            for (offset, slot) in rows.iter_mut().enumerate() {
                let row = group * rows_per_group + offset;
                let a_row = if problem.transpose {
                    inputs.matrix.column(row)
                } else {
                    inputs.matrix.row(row)
                };
                *slot = strip_dot(a_row, inputs.x, plan);
            }
        });
    Ok(output)
}

fn strip_dot(a_row: ArrayView1<'_, f32>, x: ArrayView1<'_, f32>, plan: StripPlan) -> f32 {
    let lanes = plan.lanes.clamp(1, MAX_LANES);
    let mut acc = [0.0f32; MAX_LANES];
    let mut total = 0.0f32;

    for start in (0..a_row.len()).step_by(plan.step) {
        for idx in start..start + plan.step {
            acc[idx % lanes] += a_row[idx] * x[idx];
        }
        let strip: f32 = acc[..lanes].iter().sum();
        total += plan.strip_scale * strip;
        acc[..lanes].iter_mut().for_each(|lane| *lane = 0.0);
    }
    total
}

fn reference_product(problem: &MatvecProblem, inputs: &MatvecInputs<'_>) -> Result<Array1<f32>> {
    validate_matvec_inputs(problem, inputs)?;
    let product = if problem.transpose {
        inputs.matrix.t().dot(&inputs.x)
    } else {
        inputs.matrix.dot(&inputs.x)
    };
    Ok(product)
}

/// `y = A·x`. The extra parameter selects an unroll factor.
pub struct PlainMatvec {
    vector_width: usize,
    max_block_height: usize,
    vector_hint: bool,
}

impl PlainMatvec {
    pub fn new() -> Self {
        Self {
            vector_width: DEFAULT_VECTOR_WIDTH,
            max_block_height: DEFAULT_MAX_BLOCK_HEIGHT,
            vector_hint: true,
        }
    }

    pub fn with_vector_hint(mut self, enabled: bool) -> Self {
        self.vector_hint = enabled;
        self
    }
}

impl Default for PlainMatvec {
    fn default() -> Self {
        Self::new()
    }
}

impl MatvecKernel for PlainMatvec {
    fn name(&self) -> &'static str {
        "matvec"
    }

    fn vector_width(&self) -> usize {
        self.vector_width
    }

    fn max_block_height(&self) -> usize {
        self.max_block_height
    }

    fn total_variations(&self) -> usize {
        UNROLL_FACTORS.len()
    }

    fn supports(&self, problem: &MatvecProblem, shape: &Shape) -> bool {
        UNROLL_FACTORS
            .get(shape.extra_param)
            .is_some_and(|&unroll| unroll_divides(problem, shape, self.vector_width, unroll))
    }

    fn run(&self, config: &Configuration, inputs: &MatvecInputs<'_>) -> Result<Array1<f32>> {
        ensure!(
            self.supports(&config.problem, &config.shape),
            "matvec kernel cannot run {:?}",
            config.shape
        );
        let unroll = UNROLL_FACTORS[config.extra_param()];
        let plan = StripPlan {
            step: config.group_size() * self.vector_width * unroll,
            lanes: if self.vector_hint { self.vector_width } else { 1 },
            strip_scale: 1.0,
        };
        Ok(Array1::from_vec(dispatch(config, inputs, plan)?))
    }

    fn reference(&self, problem: &MatvecProblem, inputs: &MatvecInputs<'_>) -> Result<Array1<f32>> {
        reference_product(problem, inputs)
    }
}

/// `y = αA·x + βy`. The low two bits of the extra parameter select the
/// unroll factor; the next bit applies `α` per strip instead of once at the end.
pub struct GeneralizedMatvec {
    vector_width: usize,
    max_block_height: usize,
    vector_hint: bool,
}

impl GeneralizedMatvec {
    pub fn new() -> Self {
        Self {
            vector_width: DEFAULT_VECTOR_WIDTH,
            max_block_height: DEFAULT_MAX_BLOCK_HEIGHT,
            vector_hint: true,
        }
    }

    pub fn with_vector_hint(mut self, enabled: bool) -> Self {
        self.vector_hint = enabled;
        self
    }

    fn decode(extra_param: usize) -> (usize, bool) {
        let unroll = UNROLL_FACTORS[extra_param % UNROLL_FACTORS.len()];
        let scale_per_strip = extra_param / UNROLL_FACTORS.len() == 1;
        (unroll, scale_per_strip)
    }
}

impl Default for GeneralizedMatvec {
    fn default() -> Self {
        Self::new()
    }
}

impl MatvecKernel for GeneralizedMatvec {
    fn name(&self) -> &'static str {
        "gemv"
    }

    fn vector_width(&self) -> usize {
        self.vector_width
    }

    fn max_block_height(&self) -> usize {
        self.max_block_height
    }

    fn total_variations(&self) -> usize {
        UNROLL_FACTORS.len() * 2
    }

    fn supports(&self, problem: &MatvecProblem, shape: &Shape) -> bool {
        if shape.extra_param >= self.total_variations() {
            return false;
        }
        let (unroll, _) = Self::decode(shape.extra_param);
        unroll_divides(problem, shape, self.vector_width, unroll)
    }

    fn run(&self, config: &Configuration, inputs: &MatvecInputs<'_>) -> Result<Array1<f32>> {
        ensure!(
            self.supports(&config.problem, &config.shape),
            "gemv kernel cannot run {:?}",
            config.shape
        );
        let (unroll, scale_per_strip) = Self::decode(config.extra_param());
        let plan = StripPlan {
            step: config.group_size() * self.vector_width * unroll,
            lanes: if self.vector_hint { self.vector_width } else { 1 },
            strip_scale: if scale_per_strip { inputs.alpha } else { 1.0 },
        };
        let mut output = Array1::from_vec(dispatch(config, inputs, plan)?);
        if !scale_per_strip {
            output *= inputs.alpha;
        }
        if let Some(y) = &inputs.y {
            output.scaled_add(inputs.beta, y);
        }
        Ok(output)
    }

    fn reference(&self, problem: &MatvecProblem, inputs: &MatvecInputs<'_>) -> Result<Array1<f32>> {
        let mut output = reference_product(problem, inputs)? * inputs.alpha;
        if let Some(y) = &inputs.y {
            output.scaled_add(inputs.beta, y);
        }
        Ok(output)
    }
}
