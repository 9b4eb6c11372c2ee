// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! LIFO rollback stack: every plumbing step that mutates host state pushes
//! its own undo action here; on failure the whole stack unwinds in reverse,
//! mirroring the grounding source's `UndoManager`.

use std::future::Future;
use std::pin::Pin;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default)]
pub struct UndoStack {
    actions: Vec<Box<dyn FnOnce() -> BoxFuture + Send>>,
}

impl UndoStack {
    pub fn new() -> Self {
        UndoStack::default()
    }

    pub fn push<F, Fut>(&mut self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.actions.push(Box::new(move || Box::pin(action())));
    }

    /// Runs every pushed action in reverse order, swallowing nothing but
    /// also never propagating a failure from the rollback itself: an undo
    /// step that can't complete is logged by its own closure, not here.
    pub async fn rollback(self) {
        for action in self.actions.into_iter().rev() {
            action().await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn rollback_runs_in_reverse_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut stack = UndoStack::new();
        for i in 0..3 {
            let order = Arc::clone(&order);
            stack.push(move || async move {
                order.lock().unwrap().push(i);
            });
        }
        stack.rollback().await;
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn empty_stack_rollback_is_a_noop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let stack = UndoStack::new();
        assert!(stack.is_empty());
        stack.rollback().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
