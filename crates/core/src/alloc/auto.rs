//! Scenario-Driven Allocator Selection
//!
//! Callers that know their usage pattern but not the strategy zoo pick a
//! scenario; the selector maps it onto a concrete strategy stack.

use super::{
    Backing, DedupAllocator, DedupConfig, GrowAllocator, GrowConfig, LinearAllocator,
    SystemAllocator, TagAllocator,
};

/// The usage patterns the selector understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoScenario {
    /// Values die in groups; tag release is the only free.
    PerTagFree,
    /// As `PerTagFree`, plus content interning.
    PerTagFreeDedup,
    /// Individual objects come and go (sanitizer runs).
    PerObjFree,
    /// As `PerObjFree`, plus content interning.
    PerObjFreeDedup,
    /// Everything must end up in one contiguous range.
    SingleLinearRange,
    /// As `SingleLinearRange`, plus content interning.
    SingleLinearRangeDedup,
}

#[derive(Debug, Clone, Copy)]
pub struct AutoConfig {
    pub scenario: AutoScenario,
    /// Sizing hint for strategies that need an up-front extent.
    pub estimated_max_size: usize,
}

/// Build the allocator stack for a scenario.
pub fn allocator_for(config: AutoConfig) -> Box<dyn TagAllocator> {
    let grow = || {
        GrowAllocator::new(GrowConfig {
            backing: Backing::Default,
            ..GrowConfig::default()
        })
    };
    let linear = || LinearAllocator::with_capacity(config.estimated_max_size.max(64));
    match config.scenario {
        AutoScenario::PerTagFree => Box::new(grow()),
        AutoScenario::PerTagFreeDedup => Box::new(DedupAllocator::new(
            Box::new(grow()),
            DedupConfig::default(),
        )),
        AutoScenario::PerObjFree => Box::new(SystemAllocator::new()),
        AutoScenario::PerObjFreeDedup => Box::new(DedupAllocator::new(
            Box::new(SystemAllocator::new()),
            DedupConfig::default(),
        )),
        AutoScenario::SingleLinearRange => Box::new(linear()),
        AutoScenario::SingleLinearRangeDedup => Box::new(DedupAllocator::new(
            Box::new(linear()),
            DedupConfig::default(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{AllocCaps, Strategy};

    #[test]
    fn test_scenarios_map_to_strategies() {
        let cases = [
            (AutoScenario::PerTagFree, Strategy::Grow),
            (AutoScenario::PerTagFreeDedup, Strategy::Dedup),
            (AutoScenario::PerObjFree, Strategy::System),
            (AutoScenario::PerObjFreeDedup, Strategy::Dedup),
            (AutoScenario::SingleLinearRange, Strategy::Linear),
            (AutoScenario::SingleLinearRangeDedup, Strategy::Dedup),
        ];
        for (scenario, strategy) in cases {
            let a = allocator_for(AutoConfig {
                scenario,
                estimated_max_size: 4096,
            });
            assert_eq!(a.strategy(), strategy, "{scenario:?}");
        }
    }

    #[test]
    fn test_dedup_scenarios_advertise_dedup() {
        for scenario in [
            AutoScenario::PerTagFreeDedup,
            AutoScenario::PerObjFreeDedup,
            AutoScenario::SingleLinearRangeDedup,
        ] {
            let a = allocator_for(AutoConfig {
                scenario,
                estimated_max_size: 4096,
            });
            assert!(a.caps().contains(AllocCaps::DEDUP), "{scenario:?}");
        }
    }

    #[test]
    fn test_single_linear_range_is_linear() {
        let mut a = allocator_for(AutoConfig {
            scenario: AutoScenario::SingleLinearRange,
            estimated_max_size: 1024,
        });
        let tag = a.acquire_tag().unwrap();
        a.alloc(tag, 100, 8);
        a.alloc(tag, 100, 8);
        let (_, used) = a.tag_linear(tag).unwrap();
        assert!(used >= 200);
    }
}
