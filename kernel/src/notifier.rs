//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 通知链 (Notifier Chain)
//!
//! 对应 Linux 的 notifier_block / atomic_notifier_chain
//! 参考: include/linux/notifier.h, kernel/notifier.c
//!
//! 与 Linux 侵入式链表不同，这里订阅者以 `Arc<L>` 形式保存，
//! 通过 `subscribe()` 返回的 [`NotifierId`] 注销。
//!
//! # 重入
//!
//! `fire()` 在锁内复制一份订阅者快照，释放锁之后再逐个回调。
//! 回调中可以安全地订阅、注销或再次触发通知：
//! - 回调期间新订阅的监听者不会收到本轮通知
//! - 回调期间被注销的监听者仍会收到本轮通知（快照已取）

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::sync::IrqSpinLock;

/// 订阅句柄，用于注销
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NotifierId(u64);

/// 通知链
///
/// `L` 通常是一个 trait object，例如 `dyn NetEventListener`
pub struct NotifierChain<L: ?Sized> {
    subscribers: IrqSpinLock<Vec<(NotifierId, Arc<L>)>>,
    next_id: AtomicU64,
}

impl<L: ?Sized> NotifierChain<L> {
    /// 创建空通知链
    pub const fn new() -> Self {
        Self {
            subscribers: IrqSpinLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 订阅
    ///
    /// 对应 Linux 的 atomic_notifier_chain_register()
    ///
    /// # 返回
    /// 注销时使用的句柄
    pub fn subscribe(&self, listener: Arc<L>) -> NotifierId {
        let id = NotifierId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, listener));
        id
    }

    /// 注销
    ///
    /// 对应 Linux 的 atomic_notifier_chain_unregister()
    ///
    /// # 返回
    /// 句柄存在并被移除时返回 true
    pub fn unsubscribe(&self, id: NotifierId) -> bool {
        let mut subscribers = self.subscribers.lock();
        match subscribers.iter().position(|(sid, _)| *sid == id) {
            Some(pos) => {
                subscribers.remove(pos);
                true
            }
            None => false,
        }
    }

    /// 按订阅顺序复制当前订阅者
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.subscribers
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    /// 触发通知
    ///
    /// 对应 Linux 的 atomic_notifier_call_chain()
    ///
    /// 按订阅顺序同步回调，回调时不持有订阅者锁
    pub fn fire<F>(&self, mut call: F)
    where
        F: FnMut(&L),
    {
        for listener in self.snapshot() {
            call(&*listener);
        }
    }

    /// 当前订阅者数量
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// 是否没有订阅者
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 清空所有订阅
    pub fn clear(&self) {
        self.subscribers.lock().clear();
    }
}

impl<L: ?Sized> Default for NotifierChain<L> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;
    use spin::Mutex;

    trait Counter: Send + Sync {
        fn hit(&self, tag: u32);
    }

    struct Recorder {
        log: Arc<Mutex<Vec<u32>>>,
        tag: u32,
    }

    impl Counter for Recorder {
        fn hit(&self, tag: u32) {
            self.log.lock().push(self.tag * 100 + tag);
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<u32>>>, tag: u32) -> Arc<Recorder> {
        Arc::new(Recorder { log: log.clone(), tag })
    }

    #[test]
    fn test_fire_in_subscription_order() {
        let chain: NotifierChain<dyn Counter> = NotifierChain::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        chain.subscribe(recorder(&log, 2));
        chain.subscribe(recorder(&log, 1));
        chain.subscribe(recorder(&log, 3));

        chain.fire(|l| l.hit(7));

        assert_eq!(*log.lock(), [207, 107, 307]);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_unsubscribe() {
        let chain: NotifierChain<dyn Counter> = NotifierChain::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = chain.subscribe(recorder(&log, 1));
        assert!(chain.unsubscribe(id));
        assert!(!chain.unsubscribe(id));

        chain.fire(|l| l.hit(1));
        assert!(log.lock().is_empty());
        assert!(chain.is_empty());
    }

    #[test]
    fn test_reentrant_subscribe_during_fire() {
        let chain: NotifierChain<dyn Counter> = NotifierChain::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        chain.subscribe(recorder(&log, 1));

        let calls = AtomicUsize::new(0);
        chain.fire(|l| {
            calls.fetch_add(1, Ordering::SeqCst);
            l.hit(0);
            // 回调中再次订阅不会死锁，新订阅者不参与本轮
            chain.subscribe(recorder(&log, 9));
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*log.lock(), [100]);
        assert_eq!(chain.len(), 2);
    }
}
