//! Graph fuzzer - random trust-graph mutations against the watch invariant
//!
//! Tests:
//! - Watch set equals the rank <= 1 set after every commit
//! - Fast and slow coverage stay disjoint and complete
//! - Network subscriptions match committed watches
//! - Restarts and removals mid-sequence

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trustwatch_core::{Edition, EditionHint, IdentityId, WatchResult, MAX_TRUST_VALUE, MIN_TRUST_VALUE};
use trustwatch_runtime::WatchConfig;

use crate::WatchHarness;

/// Fuzzer configuration
#[derive(Clone, Debug)]
pub struct FuzzerConfig {
    /// Identities in the graph, roots included
    pub identity_count: u64,
    /// Locally controlled identities
    pub root_count: u64,
    /// Operations to generate
    pub op_count: usize,
    /// Probability an operation is a terminate/start cycle
    pub restart_prob: f64,
    /// Probability an operation deletes an identity
    pub removal_prob: f64,
    /// Random seed
    pub seed: u64,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        FuzzerConfig {
            identity_count: 20,
            root_count: 2,
            op_count: 500,
            restart_prob: 0.02,
            removal_prob: 0.02,
            seed: 42,
        }
    }
}

impl FuzzerConfig {
    /// Light fuzzing for quick tests
    pub fn light() -> Self {
        FuzzerConfig {
            identity_count: 8,
            root_count: 1,
            op_count: 100,
            restart_prob: 0.05,
            removal_prob: 0.0,
            seed: 42,
        }
    }

    /// Heavy fuzzing for thorough testing
    pub fn heavy() -> Self {
        FuzzerConfig {
            identity_count: 60,
            root_count: 3,
            op_count: 5000,
            restart_prob: 0.01,
            removal_prob: 0.03,
            seed: 42,
        }
    }
}

/// One generated mutation
#[derive(Clone, Debug)]
pub enum FuzzOp {
    SetTrust {
        truster: IdentityId,
        trustee: IdentityId,
        value: i16,
    },
    RemoveTrust {
        truster: IdentityId,
        trustee: IdentityId,
    },
    AddIdentity(IdentityId),
    RemoveIdentity(IdentityId),
    Hint {
        source: IdentityId,
        target: IdentityId,
        edition: Edition,
    },
    Restart,
}

impl FuzzOp {
    /// Apply to the harness. Operations on deleted identities are skipped.
    pub fn apply(&self, harness: &WatchHarness) -> WatchResult<()> {
        let graph = harness.graph();
        match *self {
            FuzzOp::SetTrust {
                truster,
                trustee,
                value,
            } => {
                if graph.contains_both(truster, trustee) {
                    harness.set_trust(truster, trustee, value)?;
                }
            }
            FuzzOp::RemoveTrust { truster, trustee } => {
                harness.remove_trust(truster, trustee)?;
            }
            FuzzOp::AddIdentity(id) => {
                harness.add_identity(id)?;
            }
            FuzzOp::RemoveIdentity(id) => {
                if graph.roots().contains(&id) {
                    return Ok(());
                }
                harness.remove_identity(id)?;
            }
            FuzzOp::Hint {
                source,
                target,
                edition,
            } => {
                if graph.contains_both(source, target) {
                    harness.import_hint(EditionHint::new(source, target, edition))?;
                }
            }
            FuzzOp::Restart => {
                harness.terminate()?;
                harness.start()?;
            }
        }
        Ok(())
    }
}

/// Result of one fuzzing run
#[derive(Clone, Debug, Default)]
pub struct FuzzResult {
    pub ops_applied: usize,
    pub errors: Vec<String>,
    pub violations: Vec<String>,
}

impl FuzzResult {
    pub fn passed(&self) -> bool {
        self.errors.is_empty() && self.violations.is_empty()
    }
}

/// Graph fuzzer
pub struct GraphFuzzer {
    config: FuzzerConfig,
    rng: StdRng,
}

impl GraphFuzzer {
    pub fn new(config: FuzzerConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        GraphFuzzer { config, rng }
    }

    fn random_id(&mut self) -> IdentityId {
        IdentityId::new(self.rng.gen_range(1..=self.config.identity_count))
    }

    /// Generate the next operation
    pub fn next_op(&mut self) -> FuzzOp {
        let roll: f64 = self.rng.gen();
        if roll < self.config.restart_prob {
            return FuzzOp::Restart;
        }
        if roll < self.config.restart_prob + self.config.removal_prob {
            let id = self.random_id();
            return FuzzOp::RemoveIdentity(id);
        }

        let truster = self.random_id();
        let trustee = self.random_id();
        match self.rng.gen_range(0..10) {
            0..=5 => FuzzOp::SetTrust {
                truster,
                trustee,
                value: self
                    .rng
                    .gen_range(MIN_TRUST_VALUE as i16..=MAX_TRUST_VALUE as i16),
            },
            6 | 7 => FuzzOp::RemoveTrust { truster, trustee },
            8 => FuzzOp::AddIdentity(trustee),
            _ => FuzzOp::Hint {
                source: truster,
                target: trustee,
                edition: Edition::new(self.rng.gen_range(1..20)),
            },
        }
    }

    /// Populate a fresh harness and run every operation, checking
    /// invariants after each commit
    pub fn run(&mut self) -> FuzzResult {
        let mut result = FuzzResult::default();
        let harness = match WatchHarness::new(WatchConfig::default()) {
            Ok(h) => h,
            Err(e) => {
                result.errors.push(e.to_string());
                return result;
            }
        };

        for n in 1..=self.config.identity_count {
            let id = IdentityId::new(n);
            let setup = if n <= self.config.root_count {
                harness.add_root(id)
            } else {
                harness.add_identity(id)
            };
            if let Err(e) = setup {
                result.errors.push(e.to_string());
            }
        }
        if let Err(e) = harness.start() {
            result.errors.push(e.to_string());
            return result;
        }

        for step in 0..self.config.op_count {
            let op = self.next_op();
            if let Err(e) = op.apply(&harness) {
                result.errors.push(format!("step {}: {:?}: {}", step, op, e));
                continue;
            }
            result.ops_applied += 1;

            let (ok, violations) = harness.check_invariants();
            if !ok {
                result
                    .violations
                    .extend(violations.into_iter().map(|v| format!("step {}: {}", step, v)));
                break;
            }
        }
        result
    }
}
