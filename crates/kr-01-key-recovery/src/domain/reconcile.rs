//! # Period Reconciler
//!
//! Decides whether a signature is already explained by a stored key period,
//! before any GCD work is done. Pure: the caller persists window updates.
//!
//! For each period in `first_seen_at` order:
//!
//! | Timestamp | Validates | Outcome |
//! |-----------|-----------|---------|
//! | before `first_seen_at` | yes | `ConfirmedExtend` (new first) |
//! | after `last_seen_at` | yes | `ConfirmedExtend` (new last) |
//! | inside the window | yes | `ConfirmedWithin` |
//! | inside the window | no | `PipelineError::ConsistencyViolation` |
//!
//! Anything else moves on to the next period; no match is `NotCovered`.

use shared_types::{KeyPeriodRecord, SignatureRecord};
use tracing::{debug, error};

use super::entities::ReconcileOutcome;
use super::errors::PipelineError;
use super::validation::validate_key_data;

/// Reconcile `signature` against `periods` using stored key data.
pub fn reconcile(
    signature: &SignatureRecord,
    periods: &[KeyPeriodRecord],
) -> Result<ReconcileOutcome, PipelineError> {
    reconcile_with(signature, periods, |period, sig| {
        validate_key_data(&period.key_data, sig)
    })
}

/// Reconcile with an explicit validator.
pub fn reconcile_with<V>(
    signature: &SignatureRecord,
    periods: &[KeyPeriodRecord],
    validate: V,
) -> Result<ReconcileOutcome, PipelineError>
where
    V: Fn(&KeyPeriodRecord, &SignatureRecord) -> bool,
{
    let Some(at) = signature.timestamp else {
        debug!(signature_id = signature.id, "No timestamp, cannot reconcile");
        return Ok(ReconcileOutcome::NotCovered);
    };

    let mut ordered: Vec<&KeyPeriodRecord> = periods.iter().collect();
    ordered.sort_by_key(|period| period.first_seen_at);

    for period in ordered {
        if at < period.first_seen_at {
            if validate(period, signature) {
                debug!(
                    signature_id = signature.id,
                    key_period_id = period.id,
                    "Signature extends key period backwards"
                );
                return Ok(ReconcileOutcome::ConfirmedExtend {
                    key_period_id: period.id,
                    first_seen_at: at,
                    last_seen_at: period.last_seen_at,
                });
            }
        } else if at > period.last_seen_at {
            if validate(period, signature) {
                debug!(
                    signature_id = signature.id,
                    key_period_id = period.id,
                    "Signature extends key period forwards"
                );
                return Ok(ReconcileOutcome::ConfirmedExtend {
                    key_period_id: period.id,
                    first_seen_at: period.first_seen_at,
                    last_seen_at: at,
                });
            }
        } else if validate(period, signature) {
            return Ok(ReconcileOutcome::ConfirmedWithin {
                key_period_id: period.id,
            });
        } else {
            error!(
                signature_id = signature.id,
                key_period_id = period.id,
                domain = %signature.domain,
                selector = %signature.selector,
                "Signature inside key period does not validate"
            );
            return Err(PipelineError::ConsistencyViolation {
                domain_selector: signature.domain_selector(),
                signature_id: signature.id,
                key_period_id: period.id,
            });
        }
    }

    Ok(ReconcileOutcome::NotCovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::HashAlgorithm;
    use crate::test_fixtures::{fixture_key, signature_record, MESSAGES};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use shared_types::{KeyType, NewKeyPeriod};

    fn day(n: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, n, 12, 0, 0).unwrap()
    }

    fn period(id: u64, first: DateTime<Utc>, last: DateTime<Utc>) -> KeyPeriodRecord {
        NewKeyPeriod {
            domain_selector_pair_id: 1,
            value: "k=rsa; p=stub".into(),
            key_type: KeyType::Rsa,
            key_data: format!("key-{id}"),
            first_seen_at: first,
            last_seen_at: last,
            source: "test".into(),
        }
        .into_record(id)
    }

    fn sig_at(at: Option<DateTime<Utc>>) -> SignatureRecord {
        SignatureRecord {
            id: 7,
            domain: "example.com".into(),
            selector: "s1".into(),
            header_hash: "00".into(),
            signature: vec![],
            timestamp: at,
        }
    }

    /// Test: validating signature one day early moves first_seen_at only
    #[test]
    fn test_extend_backwards() {
        let periods = [period(1, day(10), day(20))];
        let sig = sig_at(Some(day(9)));

        let outcome = reconcile_with(&sig, &periods, |_, _| true).unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::ConfirmedExtend {
                key_period_id: 1,
                first_seen_at: day(9),
                last_seen_at: day(20),
            }
        );
    }

    /// Test: validating signature after the window moves last_seen_at
    #[test]
    fn test_extend_forwards() {
        let periods = [period(1, day(10), day(20))];
        let sig = sig_at(Some(day(21)));

        let outcome = reconcile_with(&sig, &periods, |_, _| true).unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::ConfirmedExtend {
                key_period_id: 1,
                first_seen_at: day(10),
                last_seen_at: day(21),
            }
        );
    }

    /// Test: window bounds are inclusive
    #[test]
    fn test_within_window() {
        let periods = [period(1, day(10), day(20))];
        for at in [day(10), day(15), day(20)] {
            let outcome = reconcile_with(&sig_at(Some(at)), &periods, |_, _| true).unwrap();
            assert_eq!(outcome, ReconcileOutcome::ConfirmedWithin { key_period_id: 1 });
        }
    }

    /// Test: a non-validating signature inside a window is fatal
    #[test]
    fn test_within_window_violation() {
        let periods = [period(3, day(10), day(20))];
        let err = reconcile_with(&sig_at(Some(day(12))), &periods, |_, _| false).unwrap_err();

        assert_eq!(
            err,
            PipelineError::ConsistencyViolation {
                domain_selector: shared_types::DomainSelector::new("example.com", "s1"),
                signature_id: 7,
                key_period_id: 3,
            }
        );
    }

    /// Test: non-validating adjacent signatures are not covered
    #[test]
    fn test_outside_window_not_validating() {
        let periods = [period(1, day(10), day(20))];
        let outcome = reconcile_with(&sig_at(Some(day(1))), &periods, |_, _| false).unwrap();
        assert_eq!(outcome, ReconcileOutcome::NotCovered);
    }

    /// Test: signatures without a timestamp are never reconciled
    #[test]
    fn test_no_timestamp_not_covered() {
        let periods = [period(1, day(10), day(20))];
        let outcome = reconcile_with(&sig_at(None), &periods, |_, _| panic!("not called")).unwrap();
        assert_eq!(outcome, ReconcileOutcome::NotCovered);
    }

    /// Test: periods are visited in first_seen_at order
    #[test]
    fn test_periods_sorted_before_matching() {
        let periods = [period(2, day(20), day(25)), period(1, day(5), day(10))];
        let sig = sig_at(Some(day(15)));

        let outcome = reconcile_with(&sig, &periods, |_, _| true).unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::ConfirmedExtend {
                key_period_id: 1,
                first_seen_at: day(5),
                last_seen_at: day(15),
            }
        );
    }

    /// Test: the second period matches when the first key does not validate
    #[test]
    fn test_falls_through_to_matching_key() {
        let periods = [period(1, day(5), day(10)), period(2, day(20), day(25))];
        let sig = sig_at(Some(day(15)));

        let outcome =
            reconcile_with(&sig, &periods, |period, _| period.key_data == "key-2").unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::ConfirmedExtend {
                key_period_id: 2,
                first_seen_at: day(15),
                last_seen_at: day(25),
            }
        );
    }

    /// Test: real key data drives the default validator
    #[test]
    fn test_reconcile_with_stored_key_data() {
        let key = fixture_key("e65537");
        let mut stored = period(1, day(10), day(20));
        stored.key_data = key.spki_der_base64.clone().unwrap();

        let early = Some(day(10) - Duration::days(1));
        let sig = signature_record(&key, 1, MESSAGES[0], HashAlgorithm::Sha256, early);
        let outcome = reconcile(&sig, &[stored.clone()]).unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::ConfirmedExtend {
                key_period_id: 1,
                first_seen_at: day(9),
                last_seen_at: day(20),
            }
        );

        let other = fixture_key("e3");
        let foreign =
            signature_record(&other, 2, MESSAGES[1], HashAlgorithm::Sha256, Some(day(15)));
        assert!(reconcile(&foreign, &[stored]).is_err());
    }
}
