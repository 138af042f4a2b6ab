use rand::Rng;

/// A single host-framework operation the worker issues against a session
/// (spec.md §4.5's operation table, minus `create-uninitialized` and
/// `reset-timeout`, which the worker drives implicitly around these).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    SharedRead,
    ExclusiveWrite,
    Remove,
}

/// Workload profiles controlling the mix of operations the worker issues.
///
/// | Profile     | Shared read % | Exclusive write % | Remove % |
/// |-------------|----------------|--------------------|----------|
/// | ReadHeavy   |       80       |        20          |    0     |
/// | Balanced    |       50       |        45          |    5     |
/// | WriteHeavy  |       20       |        75          |    5     |
/// | WriteOnly   |        0       |       100          |    0     |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadProfile {
    ReadHeavy,
    Balanced,
    WriteHeavy,
    WriteOnly,
}

impl WorkloadProfile {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "read-heavy" => Some(Self::ReadHeavy),
            "balanced" => Some(Self::Balanced),
            "write-heavy" => Some(Self::WriteHeavy),
            "write-only" => Some(Self::WriteOnly),
            _ => None,
        }
    }

    pub fn as_name(&self) -> &'static str {
        match self {
            Self::ReadHeavy => "read-heavy",
            Self::Balanced => "balanced",
            Self::WriteHeavy => "write-heavy",
            Self::WriteOnly => "write-only",
        }
    }

    /// Draw a random operation using `rng`.
    pub fn sample(&self, rng: &mut impl Rng) -> Op {
        let roll: u32 = rng.gen_range(0..100);
        self.op_for_roll(roll)
    }

    /// Map a roll in `0..100` to an `Op` according to the profile's percentages.
    /// Exposed for deterministic testing.
    pub fn op_for_roll(&self, roll: u32) -> Op {
        match self {
            WorkloadProfile::ReadHeavy => {
                if roll < 80 { Op::SharedRead } else { Op::ExclusiveWrite }
            }
            WorkloadProfile::Balanced => {
                if roll < 50 {
                    Op::SharedRead
                } else if roll < 95 {
                    Op::ExclusiveWrite
                } else {
                    Op::Remove
                }
            }
            WorkloadProfile::WriteHeavy => {
                if roll < 20 {
                    Op::SharedRead
                } else if roll < 95 {
                    Op::ExclusiveWrite
                } else {
                    Op::Remove
                }
            }
            WorkloadProfile::WriteOnly => Op::ExclusiveWrite,
        }
    }
}
