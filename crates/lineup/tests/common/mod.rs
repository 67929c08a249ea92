//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use lineup::column::ColumnDesc;
use lineup::provider::{DataProvider, LocalDataSource, ProviderOptions};
use parking_lot::Mutex;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Route engine logs to the test output. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn provider(records: Vec<Value>, descs: Vec<ColumnDesc>, options: ProviderOptions) -> Arc<DataProvider> {
    init_tracing();
    DataProvider::new(Arc::new(LocalDataSource::new(records)), descs, options)
}

/// Options without a debounce window.
pub fn immediate() -> ProviderOptions {
    ProviderOptions {
        reorder_debounce_ms: 0,
        ..ProviderOptions::default()
    }
}

/// Collects values pushed from listeners.
pub struct Recorder<T>(Arc<Mutex<Vec<T>>>);

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Clone> Recorder<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, value: T) {
        self.0.lock().push(value);
    }

    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.0.lock())
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
}
