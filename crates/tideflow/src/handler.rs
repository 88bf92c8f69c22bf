//! 計画専用ハンドラー
//!
//! CLI はクラウドのドライバーを持たないため、計画（equals）のみに応答する
//! ハンドラーを型ごとに登録する。プロビジョニング系のメソッドは常に失敗する。

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tideflow_engine::{
    EntryState, EntryStates, HandlerError, HandlerRegistry, StepContext, StepHandler,
};

/// 同じ型のエントリーは常にインプレース更新可能とみなすハンドラー
pub struct InspectHandler;

impl InspectHandler {
    fn unsupported(method: &str, entry: &EntryState) -> HandlerError {
        HandlerError::Unsupported(format!(
            "{} ({}) の {} には '{}' 用のドライバーが必要です",
            entry.entry_id, entry.entry_type, method, entry.entry_type
        ))
    }
}

#[async_trait]
impl StepHandler for InspectHandler {
    fn equals(&self, _candidate: &EntryState, _current: &EntryState) -> bool {
        true
    }

    async fn create(
        &self,
        candidate: &EntryState,
        _context: &StepContext,
    ) -> Result<Value, HandlerError> {
        Err(Self::unsupported("create", candidate))
    }

    async fn replace(
        &self,
        candidate: &EntryState,
        _current: &EntryState,
        _context: &StepContext,
    ) -> Result<Value, HandlerError> {
        Err(Self::unsupported("replace", candidate))
    }

    async fn preview(
        &self,
        candidate: &EntryState,
        current: &EntryState,
        _context: &StepContext,
    ) -> Result<Option<Value>, HandlerError> {
        if candidate.parameters == current.parameters {
            Ok(None)
        } else {
            Ok(Some(candidate.parameters.clone()))
        }
    }

    async fn update(
        &self,
        candidate: &EntryState,
        _current: &EntryState,
        _context: &StepContext,
    ) -> Result<Option<Value>, HandlerError> {
        Err(Self::unsupported("update", candidate))
    }

    async fn delete(
        &self,
        candidate: &EntryState,
        _context: &StepContext,
    ) -> Result<(), HandlerError> {
        Err(Self::unsupported("delete", candidate))
    }
}

/// グラフに現れるすべての型に InspectHandler を登録する
pub fn inspect_registry<'a>(graphs: impl IntoIterator<Item = &'a EntryStates>) -> HandlerRegistry {
    let handler: Arc<dyn StepHandler> = Arc::new(InspectHandler);
    let mut registry = HandlerRegistry::new();
    for graph in graphs {
        for entry in graph {
            if !registry.contains(&entry.entry_type) {
                registry.register(entry.entry_type.clone(), Arc::clone(&handler));
            }
        }
    }
    registry
}
