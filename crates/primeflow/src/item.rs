/// A candidate integer together with its position in the emitted sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Item {
    /// Zero-based emission order.
    pub sequence: u64,
    pub value: u64,
}

/// The primality verdict for one delivered [`Item`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Outcome {
    pub item: Item,
    /// Smallest factor of `item.value`, or `0` if it is prime.
    pub factor: u64,
    pub from_cache: bool,
}

impl Outcome {
    pub const fn is_prime(&self) -> bool {
        self.factor == 0
    }
}

/// Per-run emission counters reported by the publisher on completion.
///
/// For a run that reaches the end of its sequence,
/// `delivered + dropped + overwritten` equals the requested count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmitStats {
    /// Items handed to the subscriber.
    pub delivered: u64,
    /// Of `delivered`, items sent without a demand permit.
    pub unclaimed: u64,
    /// Items discarded under [`OverflowPolicy::Drop`].
    ///
    /// [`OverflowPolicy::Drop`]: crate::OverflowPolicy::Drop
    pub dropped: u64,
    /// Items replaced by a newer one under [`OverflowPolicy::Latest`].
    ///
    /// [`OverflowPolicy::Latest`]: crate::OverflowPolicy::Latest
    pub overwritten: u64,
}

impl EmitStats {
    pub const fn produced(&self) -> u64 {
        self.delivered + self.dropped + self.overwritten
    }
}

#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;
    use crate::OverflowPolicy;
    use serde_json::json;

    #[test]
    fn outcome_serializes_as_plain_fields() {
        let outcome = Outcome {
            item: Item {
                sequence: 4,
                value: 91,
            },
            factor: 7,
            from_cache: true,
        };

        let value = serde_json::to_value(outcome).expect("serialize");
        assert_eq!(
            value,
            json!({
                "item": { "sequence": 4, "value": 91 },
                "factor": 7,
                "from_cache": true,
            })
        );
        let back: Outcome = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, outcome);
    }

    #[test]
    fn policy_uses_screaming_snake_case() {
        let json = serde_json::to_string(&OverflowPolicy::PushPull).expect("serialize");
        assert_eq!(json, "\"PUSH_PULL\"");

        let err = serde_json::from_str::<OverflowPolicy>("\"sideways\"").expect_err("should fail");
        assert!(err.to_string().contains("unknown variant"));
    }
}
