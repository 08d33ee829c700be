//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 同步原语 (Synchronization Primitives)
//!
//! 遵循 Linux 内核的同步机制设计：
//! - `include/linux/spinlock.h` - 自旋锁
//! - `include/linux/irqflags.h` - 中断开关
//!
//! 网络子系统的所有共享表（接口链表、订阅者链表、ARP 表）
//! 都由关中断自旋锁保护，接收中断不会在同一执行单元上重入同一把锁。

pub mod spinlock;

pub use spinlock::{
    IrqSpinLock, IrqSpinLockGuard, IrqFlags, IrqOps, set_irq_ops,
    local_irq_save, local_irq_restore, irqs_disabled,
};
