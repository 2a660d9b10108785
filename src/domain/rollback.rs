// ==========================================
// 批量导入与回滚账本 - 回滚结果模型
// ==========================================
// 阻塞项 (blocker): 回滚整体中止，批次保持 completed
// 复核项 (review item): 回滚照常执行，但标记为降级/需人工复核
// ==========================================

use crate::domain::entity::EntityRef;
use crate::domain::import::ImportBatch;
use serde::{Deserialize, Serialize};

// ==========================================
// ReviewReason - 需人工复核的原因
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewReason {
    /// 导入之后被其他已完成批次修改
    LaterBatch { batch_ids: Vec<String> },
    /// 导入之后被非导入操作修改（修订号漂移）
    ModifiedSinceImport {
        expected_revision: i64,
        actual_revision: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub entity: EntityRef,
    pub reason: ReviewReason,
}

// ==========================================
// BlockReason - 回滚阻塞原因
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockReason {
    /// 目标实体已不存在
    EntityMissing,
    /// 待删除实体仍被其他记录引用
    ReferencedBy { dependents: Vec<EntityRef> },
    /// 待恢复的快照引用了已不存在的实体
    ReferenceMissing { targets: Vec<EntityRef> },
    /// 降级项在 rollback.allow_degraded=false 时视为阻塞
    Degraded { reason: ReviewReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackBlocker {
    pub entity: EntityRef,
    pub reason: BlockReason,
}

// ==========================================
// RollbackResult - 回滚成功结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub batch: ImportBatch,      // 已为 rolled_back
    pub reversed: usize,         // 逆转的变更记录数
    pub deleted: usize,          // 删除的新建实体数
    pub restored: usize,         // 恢复到 prior_state 的实体数
    pub degraded: bool,
    pub review_items: Vec<ReviewItem>,
}

// ==========================================
// RollbackPreview - 回滚预检（不落库）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPreview {
    pub batch_id: String,
    pub change_count: usize,
    pub blockers: Vec<RollbackBlocker>,
    pub review_items: Vec<ReviewItem>,
}

impl RollbackPreview {
    pub fn is_safe(&self) -> bool {
        self.blockers.is_empty()
    }
}
