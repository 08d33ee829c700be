//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 关中断自旋锁
//!
//! 对应 Linux 的 spin_lock_irqsave() / spin_unlock_irqrestore()
//! 参考: include/linux/spinlock.h, include/linux/irqflags.h
//!
//! 加锁顺序：先保存并关闭中断，再获取自旋锁。
//! 解锁顺序：先释放自旋锁，再恢复中断。
//!
//! 真正的中断屏蔽由体系结构层通过 [`set_irq_ops`] 安装（例如 RISC-V 的
//! sstatus.SIE）。未安装时退回到全局嵌套计数，只记录状态而不屏蔽任何中断，
//! 此时 [`irqs_disabled`] 反映的是所有执行单元的合计，不是单个 CPU 的状态。

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

/// 体系结构层提供的中断开关
///
/// 对应 Linux 的 arch_local_irq_save() / arch_local_irq_restore() / arch_irqs_disabled()
#[derive(Clone, Copy)]
pub struct IrqOps {
    /// 关闭本 CPU 中断，返回关闭前是否打开
    pub save: fn() -> bool,
    /// 按保存的状态恢复本 CPU 中断
    pub restore: fn(bool),
    /// 本 CPU 当前是否关中断
    pub disabled: fn() -> bool,
}

static IRQ_OPS: spin::Once<IrqOps> = spin::Once::new();

/// 软件回退：中断屏蔽嵌套深度
static IRQ_DISABLE_DEPTH: AtomicUsize = AtomicUsize::new(0);

/// 安装体系结构层的中断开关
///
/// 只能安装一次，须在第一次加锁之前完成；重复安装返回 false
pub fn set_irq_ops(ops: IrqOps) -> bool {
    let mut installed = false;
    IRQ_OPS.call_once(|| {
        installed = true;
        ops
    });
    installed
}

/// 保存的中断状态
///
/// 对应 Linux 的 `unsigned long flags`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct IrqFlags(bool);

impl IrqFlags {
    /// 保存时中断是否处于打开状态
    pub fn were_enabled(&self) -> bool {
        self.0
    }
}

/// 保存当前中断状态并关闭中断
///
/// 对应 Linux 的 local_irq_save()
#[inline]
pub fn local_irq_save() -> IrqFlags {
    match IRQ_OPS.get() {
        Some(ops) => IrqFlags((ops.save)()),
        None => IrqFlags(IRQ_DISABLE_DEPTH.fetch_add(1, Ordering::AcqRel) == 0),
    }
}

/// 恢复 local_irq_save() 保存的中断状态
///
/// 对应 Linux 的 local_irq_restore()
#[inline]
pub fn local_irq_restore(flags: IrqFlags) {
    match IRQ_OPS.get() {
        Some(ops) => (ops.restore)(flags.0),
        None => {
            let prev = IRQ_DISABLE_DEPTH.fetch_sub(1, Ordering::AcqRel);
            debug_assert!(prev > 0, "local_irq_restore: unbalanced restore");
        }
    }
}

/// 当前是否处于关中断状态
#[inline]
pub fn irqs_disabled() -> bool {
    match IRQ_OPS.get() {
        Some(ops) => (ops.disabled)(),
        None => IRQ_DISABLE_DEPTH.load(Ordering::Acquire) > 0,
    }
}

/// 关中断自旋锁
///
/// 持锁期间中断被屏蔽，临界区内不得阻塞，也不得调用可能睡眠的代码。
pub struct IrqSpinLock<T: ?Sized> {
    inner: spin::Mutex<T>,
}

/// IrqSpinLock 的守卫
///
/// Drop 时先释放内部锁，再恢复中断状态
pub struct IrqSpinLockGuard<'a, T: ?Sized + 'a> {
    guard: ManuallyDrop<spin::MutexGuard<'a, T>>,
    flags: IrqFlags,
}

impl<T> IrqSpinLock<T> {
    /// 创建新的关中断自旋锁
    pub const fn new(value: T) -> Self {
        Self {
            inner: spin::Mutex::new(value),
        }
    }

    /// 消耗锁，取出内部数据
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: ?Sized> IrqSpinLock<T> {
    /// 关中断并加锁
    ///
    /// 对应 Linux 的 spin_lock_irqsave()
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T> {
        let flags = local_irq_save();
        let guard = self.inner.lock();
        IrqSpinLockGuard {
            guard: ManuallyDrop::new(guard),
            flags,
        }
    }

    /// 尝试加锁，失败时立即恢复中断并返回 None
    pub fn try_lock(&self) -> Option<IrqSpinLockGuard<'_, T>> {
        let flags = local_irq_save();
        match self.inner.try_lock() {
            Some(guard) => Some(IrqSpinLockGuard {
                guard: ManuallyDrop::new(guard),
                flags,
            }),
            None => {
                local_irq_restore(flags);
                None
            }
        }
    }

    /// 锁当前是否被持有
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// 通过独占引用直接访问数据，无需加锁
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

impl<T: Default> Default for IrqSpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + core::fmt::Debug> core::fmt::Debug for IrqSpinLock<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.inner.try_lock() {
            Some(guard) => f.debug_struct("IrqSpinLock").field("data", &&*guard).finish(),
            None => f.write_str("IrqSpinLock { <locked> }"),
        }
    }
}

impl<'a, T: ?Sized> Deref for IrqSpinLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<'a, T: ?Sized> DerefMut for IrqSpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<'a, T: ?Sized> Drop for IrqSpinLockGuard<'a, T> {
    fn drop(&mut self) {
        // SAFETY: guard 只在这里释放一次，之后不再访问
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        local_irq_restore(self.flags);
    }
}
