/// # Summary
/// 固定容量的滚动环形缓冲区。
///
/// # Invariants
/// - 内存空间在初始化时一次性分配，后续不再扩容。
/// - `len() <= capacity` 恒成立，始终保留最近 N 个元素。
#[derive(Debug, Clone)]
pub struct RollingBuffer<T> {
    // 内部存储容器
    data: Vec<T>,
    // 最大容量
    capacity: usize,
    // 缓冲区已满时，下一次覆盖的位置 (即最旧元素的位置)
    cursor: usize,
}

impl<T> RollingBuffer<T> {
    /// # Summary
    /// 创建一个新的滚动缓冲区。
    ///
    /// # Logic
    /// 调用 Vec::with_capacity 预分配指定大小的内存。容量为 0 时按 1 处理。
    ///
    /// # Arguments
    /// * `capacity`: 固定容量上限。
    ///
    /// # Returns
    /// 初始化后的 RollingBuffer 实例。
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    /// # Summary
    /// 向缓冲区推送新元素，满时淘汰最旧的元素。
    ///
    /// # Logic
    /// 1. 若未满，则直接 push，无淘汰。
    /// 2. 若已满，则用新元素替换 cursor 处的最旧元素，并递增（取模）cursor。
    ///
    /// # Arguments
    /// * `item`: 待插入的元素。
    ///
    /// # Returns
    /// 被淘汰的元素；未满时返回 None。
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.data.len() < self.capacity {
            self.data.push(item);
            return None;
        }
        let evicted = self
            .data
            .get_mut(self.cursor)
            .map(|slot| std::mem::replace(slot, item));
        self.cursor = (self.cursor + 1) % self.capacity;
        evicted
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }
}
