//! Shared fixtures for integration tests: a three-robot store, link settings
//! tuned for fast tests, and a polling wait helper.
#![allow(dead_code)] // each test binary uses a different subset

use relaytwin::device::DeviceSet;
use relaytwin::link::LinkSettings;
use relaytwin::store::{DeviceStore, StoreSettings};
use std::sync::Arc;
use std::time::Duration;

pub const REFERENCE_PACKET: &str = "R2|45s|FOLLOW|CENTER|SPD:200|L:1234,R:1230|D:25cm|CPgde";

pub fn store() -> Arc<DeviceStore> {
    Arc::new(DeviceStore::new(
        DeviceSet::new(["R1", "R2", "R3"]),
        StoreSettings::default(),
    ))
}

/// 1 ms polls, 50 ms backoff, no settle delay.
pub fn fast_link() -> LinkSettings {
    LinkSettings {
        poll_interval: Duration::from_millis(1),
        reconnect_backoff: Duration::from_millis(50),
        settle: Duration::ZERO,
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub async fn wait_until<F: FnMut() -> bool>(mut cond: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cond()
}
