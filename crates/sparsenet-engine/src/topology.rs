//! Random topology generation
//!
//! [`TopologyBuilder::build`] is a pure function of its specs and the state of
//! the [`RandomStream`] it is given: candidate pairs are visited row-major
//! (target, then source) and each consumes exactly one uniform draw, followed
//! by one weight draw per realized edge.

use serde::{Deserialize, Serialize};

use crate::{
    connectivity::{Connectivity, Edge},
    error::*,
    rng::RandomStream,
    NodeId,
};

/// Graph family and its generative parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologySpec {
    /// Every ordered pair is connected independently with probability `density`
    UniformRandom {
        /// Fraction of possible edges realized
        density: f64,
    },
    /// Every node receives exactly `degree_target` distinct sources
    DegreeConstrained {
        /// Number of incoming edges per node (mean out-degree)
        degree_target: usize,
    },
    /// Contiguous, near-equal clusters with dense interiors
    Clustered {
        /// Number of clusters
        cluster_count: usize,
        /// Connection probability inside a cluster
        cluster_density: f64,
        /// Connection probability between clusters
        #[serde(default)]
        inter_density: f64,
    },
    /// Consecutive populations; node of population k receives each possible
    /// source with probability `in_degree / sizes[k]`
    Populations {
        /// Population sizes, summing to the node count
        sizes: Vec<usize>,
        /// Mean number of inputs received from each population
        in_degree: f64,
    },
}

/// Distribution of edge weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeightSpec {
    /// All weights equal `scale`
    Fixed {
        /// Weight value
        scale: f64,
    },
    /// Weights uniform in `[low, high)`
    Uniform {
        /// Lower bound
        low: f64,
        /// Upper bound
        high: f64,
    },
    /// Excitatory/inhibitory mix; each source node is inhibitory with
    /// probability `sign_ratio` and all its outgoing weights share that sign
    SignedSplit {
        /// Weight magnitude
        scale: f64,
        /// Fraction of inhibitory source nodes
        sign_ratio: f64,
        /// Relative magnitude jitter in `[0, 1)`
        #[serde(default)]
        jitter: f64,
    },
    /// Block weights `matrix[k][l]` for edges from population l to population k;
    /// only valid with [`TopologySpec::Populations`]
    PopulationCoupling {
        /// Coupling strength per (target, source) population pair
        matrix: Vec<Vec<f64>>,
    },
}

/// Generates connectivity from topology and weight specs
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    node_count: usize,
    topology: TopologySpec,
    weights: WeightSpec,
    allow_self_loops: bool,
}

impl TopologyBuilder {
    /// Create a builder with validation of all parameters against `node_count`
    pub fn new(node_count: usize, topology: TopologySpec, weights: WeightSpec) -> Result<Self> {
        let builder = Self {
            node_count,
            topology,
            weights,
            allow_self_loops: false,
        };
        builder.validate()?;
        Ok(builder)
    }

    /// Permit edges from a node to itself
    pub fn with_self_loops(mut self, allowed: bool) -> Result<Self> {
        self.allow_self_loops = allowed;
        self.validate()?;
        Ok(self)
    }

    /// Validate specs against the node count
    pub fn validate(&self) -> Result<()> {
        if self.node_count == 0 {
            return Err(EngineError::invalid_spec("node_count", 0, "> 0"));
        }
        let max_sources = self.max_sources();

        match &self.topology {
            TopologySpec::UniformRandom { density } => check_probability("density", *density)?,
            TopologySpec::DegreeConstrained { degree_target } => {
                if *degree_target > max_sources {
                    return Err(EngineError::invalid_spec(
                        "degree_target",
                        degree_target,
                        format!("<= {} for {} nodes", max_sources, self.node_count),
                    ));
                }
            }
            TopologySpec::Clustered {
                cluster_count,
                cluster_density,
                inter_density,
            } => {
                if *cluster_count == 0 || *cluster_count > self.node_count {
                    return Err(EngineError::invalid_spec(
                        "cluster_count",
                        cluster_count,
                        format!("in [1, {}]", self.node_count),
                    ));
                }
                check_probability("cluster_density", *cluster_density)?;
                check_probability("inter_density", *inter_density)?;
            }
            TopologySpec::Populations { sizes, in_degree } => {
                let total: usize = sizes.iter().sum();
                if sizes.is_empty() || total != self.node_count {
                    return Err(EngineError::invalid_spec(
                        "sizes",
                        format!("{:?}", sizes),
                        format!("non-empty, summing to node_count {}", self.node_count),
                    ));
                }
                if !in_degree.is_finite() || *in_degree < 0.0 {
                    return Err(EngineError::invalid_spec("in_degree", in_degree, ">= 0"));
                }
                for &size in sizes {
                    if size == 0 || *in_degree > size as f64 {
                        return Err(EngineError::invalid_spec(
                            "in_degree",
                            in_degree,
                            format!("<= every population size (found size {})", size),
                        ));
                    }
                }
            }
        }

        match &self.weights {
            WeightSpec::Fixed { scale } => check_finite("scale", *scale)?,
            WeightSpec::Uniform { low, high } => {
                check_finite("low", *low)?;
                check_finite("high", *high)?;
                if low > high {
                    return Err(EngineError::invalid_spec("high", high, format!(">= low ({})", low)));
                }
            }
            WeightSpec::SignedSplit {
                scale,
                sign_ratio,
                jitter,
            } => {
                check_finite("scale", *scale)?;
                check_probability("sign_ratio", *sign_ratio)?;
                if !(0.0..1.0).contains(jitter) {
                    return Err(EngineError::invalid_spec("jitter", jitter, "in [0, 1)"));
                }
            }
            WeightSpec::PopulationCoupling { matrix } => {
                let TopologySpec::Populations { sizes, .. } = &self.topology else {
                    return Err(EngineError::invalid_spec(
                        "weights",
                        "population_coupling",
                        "a populations topology",
                    ));
                };
                let p = sizes.len();
                if matrix.len() != p || matrix.iter().any(|row| row.len() != p) {
                    return Err(EngineError::invalid_spec(
                        "matrix",
                        format!("{} rows", matrix.len()),
                        format!("{}x{} (one entry per population pair)", p, p),
                    ));
                }
                for value in matrix.iter().flatten() {
                    check_finite("matrix", *value)?;
                }
            }
        }
        Ok(())
    }

    /// Generate the connectivity, consuming draws from `rng`
    pub fn build(&self, rng: &mut RandomStream) -> Result<Connectivity> {
        self.validate()?;

        let inhibitory = self.sample_signs(rng);
        let mut edges = Vec::new();

        match &self.topology {
            TopologySpec::UniformRandom { density } => {
                self.bernoulli_pairs(rng, &mut edges, &inhibitory, |_, _| *density);
            }
            TopologySpec::DegreeConstrained { degree_target } => {
                self.fixed_in_degree(rng, &mut edges, &inhibitory, *degree_target);
            }
            TopologySpec::Clustered {
                cluster_count,
                cluster_density,
                inter_density,
            } => {
                let clusters = partition(self.node_count, *cluster_count);
                self.bernoulli_pairs(rng, &mut edges, &inhibitory, |t, s| {
                    if clusters[t] == clusters[s] {
                        *cluster_density
                    } else {
                        *inter_density
                    }
                });
            }
            TopologySpec::Populations { sizes, in_degree } => {
                let membership = membership(sizes);
                self.bernoulli_pairs(rng, &mut edges, &inhibitory, |t, _| {
                    *in_degree / sizes[membership[t]] as f64
                });
            }
        }

        log::debug!(
            "Built topology with {} nodes and {} edges",
            self.node_count,
            edges.len()
        );
        Connectivity::from_edges(self.node_count, edges)
    }

    /// Population index of every node, if the topology has populations
    pub fn populations(&self) -> Option<Vec<usize>> {
        match &self.topology {
            TopologySpec::Populations { sizes, .. } => Some(membership(sizes)),
            TopologySpec::Clustered { cluster_count, .. } => {
                Some(partition(self.node_count, *cluster_count))
            }
            _ => None,
        }
    }

    fn max_sources(&self) -> usize {
        if self.allow_self_loops {
            self.node_count
        } else {
            self.node_count - 1
        }
    }

    fn bernoulli_pairs(
        &self,
        rng: &mut RandomStream,
        edges: &mut Vec<Edge>,
        inhibitory: &[bool],
        probability: impl Fn(usize, usize) -> f64,
    ) {
        for target in 0..self.node_count {
            for source in 0..self.node_count {
                if source == target && !self.allow_self_loops {
                    continue;
                }
                if rng.uniform() < probability(target, source) {
                    let weight = self.sample_weight(rng, target, source, inhibitory);
                    edges.push(Edge::new(
                        NodeId::from_index(source),
                        NodeId::from_index(target),
                        weight,
                    ));
                }
            }
        }
    }

    fn fixed_in_degree(
        &self,
        rng: &mut RandomStream,
        edges: &mut Vec<Edge>,
        inhibitory: &[bool],
        degree: usize,
    ) {
        let mut candidates: Vec<usize> = Vec::with_capacity(self.node_count);
        for target in 0..self.node_count {
            candidates.clear();
            candidates.extend((0..self.node_count).filter(|&s| self.allow_self_loops || s != target));

            // partial Fisher-Yates: the first `degree` slots are the chosen sources
            for i in 0..degree {
                let j = i + rng.index(candidates.len() - i);
                candidates.swap(i, j);
            }
            let mut chosen = candidates[..degree].to_vec();
            chosen.sort_unstable();

            for source in chosen {
                let weight = self.sample_weight(rng, target, source, inhibitory);
                edges.push(Edge::new(
                    NodeId::from_index(source),
                    NodeId::from_index(target),
                    weight,
                ));
            }
        }
    }

    fn sample_signs(&self, rng: &mut RandomStream) -> Vec<bool> {
        match &self.weights {
            WeightSpec::SignedSplit { sign_ratio, .. } => {
                (0..self.node_count).map(|_| rng.bernoulli(*sign_ratio)).collect()
            }
            _ => Vec::new(),
        }
    }

    fn sample_weight(
        &self,
        rng: &mut RandomStream,
        target: usize,
        source: usize,
        inhibitory: &[bool],
    ) -> f32 {
        let weight = match &self.weights {
            WeightSpec::Fixed { scale } => *scale,
            WeightSpec::Uniform { low, high } => rng.uniform_range(*low, *high),
            WeightSpec::SignedSplit { scale, jitter, .. } => {
                let magnitude = if *jitter > 0.0 {
                    scale.abs() * (1.0 + rng.uniform_range(-jitter, *jitter))
                } else {
                    scale.abs()
                };
                if inhibitory[source] {
                    -magnitude
                } else {
                    magnitude
                }
            }
            WeightSpec::PopulationCoupling { matrix } => match &self.topology {
                TopologySpec::Populations { sizes, .. } => {
                    let pop_of = |node: usize| population_of(sizes, node);
                    matrix[pop_of(target)][pop_of(source)]
                }
                _ => 0.0,
            },
        };
        weight as f32
    }
}

/// Convenience wrapper around [`TopologyBuilder`]
pub fn build(
    node_count: usize,
    topology: &TopologySpec,
    weights: &WeightSpec,
    rng: &mut RandomStream,
) -> Result<Connectivity> {
    TopologyBuilder::new(node_count, topology.clone(), weights.clone())?.build(rng)
}

fn check_probability(parameter: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EngineError::invalid_spec(parameter, value, "in [0, 1]"));
    }
    Ok(())
}

fn check_finite(parameter: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(EngineError::invalid_spec(parameter, value, "finite"));
    }
    Ok(())
}

/// Cluster index of each node for `count` contiguous near-equal clusters
fn partition(node_count: usize, count: usize) -> Vec<usize> {
    (0..node_count).map(|i| i * count / node_count).collect()
}

fn membership(sizes: &[usize]) -> Vec<usize> {
    sizes
        .iter()
        .enumerate()
        .flat_map(|(k, &size)| std::iter::repeat(k).take(size))
        .collect()
}

fn population_of(sizes: &[usize], node: usize) -> usize {
    let mut end = 0;
    for (k, &size) in sizes.iter().enumerate() {
        end += size;
        if node < end {
            return k;
        }
    }
    sizes.len().saturating_sub(1)
}
