//! Intrusive pointer 单元测试
//!
//! 测试引用计数、强/弱指针交互以及两阶段析构

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{IntrusivePtr, IntrusiveTarget, RefCounts};
use crate::{impl_intrusive_target, impl_upcast};

mod concurrency;

/// Teardown counters shared between a test and its tensors
#[derive(Debug, Default)]
struct Counters {
    released: AtomicUsize,
    destroyed: AtomicUsize,
}

impl Counters {
    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Target with a releasable payload
#[derive(Debug)]
struct Tensor {
    counts: RefCounts,
    data: Mutex<Option<Vec<f32>>>,
    counters: Arc<Counters>,
}

impl Tensor {
    fn new(
        counters: &Arc<Counters>,
        data: Vec<f32>,
    ) -> Self {
        Self {
            counts: RefCounts::new(),
            data: Mutex::new(Some(data)),
            counters: Arc::clone(counters),
        }
    }

    fn len(&self) -> Option<usize> {
        self.data.lock().as_ref().map(Vec::len)
    }

    fn free(&self) {
        self.data.lock().take();
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl_intrusive_target!(Tensor, counts, release = free);

impl Drop for Tensor {
    fn drop(&mut self) {
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

trait Storage: IntrusiveTarget + Send + Sync {
    fn nbytes(&self) -> usize;
}

impl Storage for Tensor {
    fn nbytes(&self) -> usize {
        self.len().unwrap_or(0) * std::mem::size_of::<f32>()
    }
}

impl_upcast!(Tensor => dyn Storage);

/// Target without a release hook
#[derive(Debug, Default, Clone)]
struct Plain {
    counts: RefCounts,
    value: i32,
}

impl_intrusive_target!(Plain, counts);

fn tensor(counters: &Arc<Counters>) -> IntrusivePtr<Tensor> {
    IntrusivePtr::new(Tensor::new(counters, vec![1.0, 2.0, 3.0]))
}
