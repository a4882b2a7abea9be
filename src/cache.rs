//! Last-known copies of remote reads, keyed by [`RemoteKey`], with an
//! independent staleness flag per key.

use crate::{
    errors::RemoteReadError,
    remote::{
        Address,
        RemoteData,
        RemoteKey,
        RemoteReader,
    },
};
use chrono::{
    DateTime,
    Utc,
};
use futures::future::join_all;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tracing::{
    debug,
    warn,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteValue {
    pub key: RemoteKey,
    /// `None` when the service answered with no value.
    pub value: Option<RemoteData>,
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
}

#[derive(Debug, Default)]
struct Entries {
    values: HashMap<RemoteKey, RemoteValue>,
    // bumped by every mark_stale; a read only clears `stale` if the epoch it
    // started under is still current
    epochs: HashMap<RemoteKey, u64>,
}

impl Entries {
    fn epoch(&self, key: RemoteKey) -> u64 {
        self.epochs.get(&key).copied().unwrap_or_default()
    }
}

/// Shared handle; clones observe the same entries.
#[derive(Clone, Debug, Default)]
pub struct RemoteValueCache {
    inner: Arc<Mutex<Entries>>,
}

impl RemoteValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: RemoteKey) -> Option<RemoteValue> {
        self.entries().values.get(&key).cloned()
    }

    pub fn is_stale(&self, key: RemoteKey) -> bool {
        self.entries()
            .values
            .get(&key)
            .is_some_and(|value| value.stale)
    }

    /// Overwrites `key` and clears its stale flag.
    pub fn set(&self, key: RemoteKey, value: Option<RemoteData>) {
        let mut entries = self.entries();
        entries.values.insert(
            key,
            RemoteValue {
                key,
                value,
                fetched_at: Utc::now(),
                stale: false,
            },
        );
    }

    /// Flags `keys` as stale. Last-known values are kept; keys never fetched
    /// stay absent.
    pub fn mark_stale(&self, keys: &[RemoteKey]) {
        let mut entries = self.entries();
        for key in keys {
            *entries.epochs.entry(*key).or_default() += 1;
            if let Some(value) = entries.values.get_mut(key) {
                value.stale = true;
            }
        }
        debug!(?keys, "marked remote values stale");
    }

    pub fn stale_keys(&self) -> Vec<RemoteKey> {
        let mut keys: Vec<_> = self
            .entries()
            .values
            .values()
            .filter(|value| value.stale)
            .map(|value| value.key)
            .collect();
        keys.sort();
        keys
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            values: self.entries().values.clone(),
        }
    }

    /// Re-reads `keys` through `reader`. Each successful read is stored;
    /// failed keys keep their last value and their stale flag. Caller-scoped
    /// keys are skipped while no caller is connected.
    pub async fn refresh<R: RemoteReader>(
        &self,
        reader: &R,
        keys: &[RemoteKey],
        caller: Option<&Address>,
    ) -> Result<(), RemoteReadError> {
        let requested: Vec<(RemoteKey, u64)> = {
            let entries = self.entries();
            keys.iter()
                .filter(|key| caller.is_some() || !key.is_caller_scoped())
                .map(|key| (*key, entries.epoch(*key)))
                .collect()
        };

        let reads = requested.iter().map(|(key, _)| async move {
            let result = reader.read_value(*key, caller).await;
            (*key, result)
        });
        let results = join_all(reads).await;

        let mut failures = Vec::new();
        let mut entries = self.entries();
        for ((key, result), (_, epoch)) in results.into_iter().zip(requested) {
            match result {
                Ok(value) => {
                    let superseded = entries.epoch(key) != epoch;
                    entries.values.insert(
                        key,
                        RemoteValue {
                            key,
                            value,
                            fetched_at: Utc::now(),
                            stale: superseded,
                        },
                    );
                    if superseded {
                        debug!(%key, "read predates a newer invalidation; keeping stale");
                    }
                }
                Err(err) => {
                    warn!(%key, error = %err, "remote read failed");
                    failures.push((key, err.to_string()));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RemoteReadError { failures })
        }
    }
}

/// Point-in-time copy of the cache, the sole remote input to derivation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CacheSnapshot {
    values: HashMap<RemoteKey, RemoteValue>,
}

impl CacheSnapshot {
    pub fn from_values(values: impl IntoIterator<Item = (RemoteKey, RemoteData)>) -> Self {
        let fetched_at = Utc::now();
        Self {
            values: values
                .into_iter()
                .map(|(key, value)| {
                    (
                        key,
                        RemoteValue {
                            key,
                            value: Some(value),
                            fetched_at,
                            stale: false,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn get(&self, key: RemoteKey) -> Option<&RemoteValue> {
        self.values.get(&key)
    }

    /// Value under `key`, or `None` when never fetched or answered empty.
    pub fn data(&self, key: RemoteKey) -> Option<&RemoteData> {
        self.values.get(&key).and_then(|value| value.value.as_ref())
    }

    pub fn is_stale(&self, key: RemoteKey) -> bool {
        self.values.get(&key).is_some_and(|value| value.stale)
    }

    /// True while any key readable for `caller` is absent, or any entry is
    /// stale. Caller-scoped keys are never fetched without a caller.
    pub fn is_loading(&self, caller: Option<&Address>) -> bool {
        RemoteKey::ALL
            .iter()
            .filter(|key| caller.is_some() || !key.is_caller_scoped())
            .any(|key| !self.values.contains_key(key))
            || self.values.values().any(|value| value.stale)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        amount::Amount,
        test_helpers::FakeRemote,
    };

    #[test]
    fn mark_stale__keeps_last_known_value() {
        // given
        let cache = RemoteValueCache::new();
        let pool = RemoteData::Amount(Amount::from_units(500));
        cache.set(RemoteKey::CurrentPoolAmount, Some(pool.clone()));

        // when
        cache.mark_stale(&[RemoteKey::CurrentPoolAmount]);

        // then
        let entry = cache.get(RemoteKey::CurrentPoolAmount).unwrap();
        assert!(entry.stale);
        assert_eq!(entry.value, Some(pool));
    }

    #[test]
    fn mark_stale__leaves_never_fetched_keys_absent() {
        let cache = RemoteValueCache::new();

        cache.mark_stale(&[RemoteKey::TicketOwnerList]);

        assert_eq!(cache.get(RemoteKey::TicketOwnerList), None);
        assert!(!cache.is_stale(RemoteKey::TicketOwnerList));
    }

    #[test]
    fn set__clears_stale_flag() {
        let cache = RemoteValueCache::new();
        cache.set(RemoteKey::RemainingTicketCount, Some(RemoteData::Count(3)));
        cache.mark_stale(&[RemoteKey::RemainingTicketCount]);

        cache.set(RemoteKey::RemainingTicketCount, Some(RemoteData::Count(2)));

        assert!(!cache.is_stale(RemoteKey::RemainingTicketCount));
        assert_eq!(
            cache.snapshot().data(RemoteKey::RemainingTicketCount),
            Some(&RemoteData::Count(2))
        );
    }

    #[tokio::test]
    async fn refresh__stores_values_and_clears_stale() {
        // given
        let remote = FakeRemote::new();
        remote.set_value(RemoteKey::RemainingTicketCount, RemoteData::Count(7));
        let cache = RemoteValueCache::new();
        cache.set(RemoteKey::RemainingTicketCount, Some(RemoteData::Count(9)));
        cache.mark_stale(&[RemoteKey::RemainingTicketCount]);

        // when
        let result = cache
            .refresh(&remote, &[RemoteKey::RemainingTicketCount], None)
            .await;

        // then
        assert_eq!(result, Ok(()));
        let entry = cache.get(RemoteKey::RemainingTicketCount).unwrap();
        assert!(!entry.stale);
        assert_eq!(entry.value, Some(RemoteData::Count(7)));
    }

    #[tokio::test]
    async fn refresh__failure_keeps_stale_and_last_value() {
        // given
        let remote = FakeRemote::new();
        remote.fail_reads(RemoteKey::CurrentPoolAmount);
        let cache = RemoteValueCache::new();
        let pool = RemoteData::Amount(Amount::from_units(40));
        cache.set(RemoteKey::CurrentPoolAmount, Some(pool.clone()));
        cache.mark_stale(&[RemoteKey::CurrentPoolAmount]);

        // when
        let err = cache
            .refresh(&remote, &[RemoteKey::CurrentPoolAmount], None)
            .await
            .unwrap_err();

        // then
        assert_eq!(err.keys().collect::<Vec<_>>(), vec![RemoteKey::CurrentPoolAmount]);
        let entry = cache.get(RemoteKey::CurrentPoolAmount).unwrap();
        assert!(entry.stale);
        assert_eq!(entry.value, Some(pool));
    }

    #[tokio::test]
    async fn refresh__failed_key_does_not_block_other_keys() {
        let remote = FakeRemote::new();
        remote.fail_reads(RemoteKey::CurrentPoolAmount);
        remote.set_value(RemoteKey::RemainingTicketCount, RemoteData::Count(1));
        let cache = RemoteValueCache::new();

        let result = cache
            .refresh(
                &remote,
                &[RemoteKey::CurrentPoolAmount, RemoteKey::RemainingTicketCount],
                None,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(cache.get(RemoteKey::CurrentPoolAmount), None);
        assert_eq!(
            cache.snapshot().data(RemoteKey::RemainingTicketCount),
            Some(&RemoteData::Count(1))
        );
    }

    #[tokio::test]
    async fn refresh__skips_caller_scoped_keys_without_caller() {
        let remote = FakeRemote::new();
        remote.set_value(
            RemoteKey::WinningsForCaller,
            RemoteData::Amount(Amount::from_units(5)),
        );
        let cache = RemoteValueCache::new();

        cache
            .refresh(&remote, &[RemoteKey::WinningsForCaller], None)
            .await
            .unwrap();

        assert_eq!(cache.get(RemoteKey::WinningsForCaller), None);
        assert_eq!(remote.read_count(RemoteKey::WinningsForCaller), 0);
    }

    #[tokio::test]
    async fn is_loading__settles_without_caller_scoped_keys_when_no_caller() {
        // given
        let remote = FakeRemote::new();
        let cache = RemoteValueCache::new();
        let caller = Address::new([3; 20]);

        // when
        cache.refresh(&remote, &RemoteKey::ALL, None).await.unwrap();

        // then
        assert!(!cache.snapshot().is_loading(None));
        assert!(cache.snapshot().is_loading(Some(&caller)));
        cache
            .refresh(&remote, &RemoteKey::ALL, Some(&caller))
            .await
            .unwrap();
        assert!(!cache.snapshot().is_loading(Some(&caller)));
    }

    #[tokio::test]
    async fn refresh__read_started_before_invalidation_stays_stale() {
        // given
        let remote = FakeRemote::new();
        remote.set_value(RemoteKey::RemainingTicketCount, RemoteData::Count(10));
        let gate = remote.hold_reads();
        let cache = RemoteValueCache::new();
        cache.set(RemoteKey::RemainingTicketCount, Some(RemoteData::Count(10)));

        // when
        let refresh = cache.refresh(&remote, &[RemoteKey::RemainingTicketCount], None);
        let invalidate = async {
            tokio::task::yield_now().await;
            cache.mark_stale(&[RemoteKey::RemainingTicketCount]);
            gate.release();
        };
        let (result, ()) = tokio::join!(refresh, invalidate);

        // then
        assert_eq!(result, Ok(()));
        assert!(cache.is_stale(RemoteKey::RemainingTicketCount));
    }
}
