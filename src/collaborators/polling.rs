// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Polling service collaborator (§6, §4.7). Field values live in the
//! automation layer; this crate only subscribes and polls once a second
//! (§4.7 step 3).

use parking_lot::Mutex;
use std::collections::HashMap;

/// A device-moniker + field-name pair identifying one subscribable value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub moniker: String,
    pub field: String,
}

impl FieldKey {
    pub fn new(moniker: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            moniker: moniker.into(),
            field: field.into(),
        }
    }
}

/// A field's last-polled value and validity (§3 field subscriptions).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldValue {
    pub formatted: String,
    pub valid: bool,
}

/// A live subscription handle returned by [`PollingService::register_field`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription(pub FieldKey);

/// The narrow façade onto the automation system's field polling engine.
pub trait PollingService: Send + Sync {
    /// Registers interest in a field, returning a subscription handle.
    fn register_field(&self, moniker: &str, field: &str) -> Subscription;

    /// Polls the current value for `subscription`; returns `Some(value)`
    /// only when it changed since the last call for this subscription.
    fn update_value(&self, subscription: &Subscription) -> Option<FieldValue>;

    /// The last known value/validity regardless of whether it changed.
    fn last_value(&self, subscription: &Subscription) -> FieldValue;
}

/// An in-memory polling service for tests: values are pushed in by the
/// test and `update_value` reports a change exactly once per push.
#[derive(Default)]
pub struct MockPollingService {
    values: Mutex<HashMap<FieldKey, (FieldValue, u64)>>,
    seen: Mutex<HashMap<FieldKey, u64>>,
}

impl MockPollingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a new value for `key`, bumping its change counter.
    pub fn set(&self, key: FieldKey, value: FieldValue) {
        let mut values = self.values.lock();
        let entry = values.entry(key).or_insert((FieldValue::default(), 0));
        entry.0 = value;
        entry.1 += 1;
    }
}

impl PollingService for MockPollingService {
    fn register_field(&self, moniker: &str, field: &str) -> Subscription {
        let key = FieldKey::new(moniker, field);
        self.values
            .lock()
            .entry(key.clone())
            .or_insert((FieldValue::default(), 0));
        Subscription(key)
    }

    fn update_value(&self, subscription: &Subscription) -> Option<FieldValue> {
        let values = self.values.lock();
        let (value, version) = values.get(&subscription.0)?.clone();
        let mut seen = self.seen.lock();
        let last_seen = seen.entry(subscription.0.clone()).or_insert(0);
        if *last_seen == version {
            None
        } else {
            *last_seen = version;
            Some(value)
        }
    }

    fn last_value(&self, subscription: &Subscription) -> FieldValue {
        self.values
            .lock()
            .get(&subscription.0)
            .map(|(v, _)| v.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_change_once_per_push() {
        let svc = MockPollingService::new();
        let sub = svc.register_field("LR-Thermo", "Temperature");
        assert_eq!(svc.update_value(&sub), None);

        svc.set(
            sub.0.clone(),
            FieldValue {
                formatted: "72".into(),
                valid: true,
            },
        );
        assert_eq!(
            svc.update_value(&sub),
            Some(FieldValue {
                formatted: "72".into(),
                valid: true
            })
        );
        assert_eq!(svc.update_value(&sub), None);
    }
}
