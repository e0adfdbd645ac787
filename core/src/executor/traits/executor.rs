use std::collections::HashMap;

use async_trait::async_trait;

use crate::executor::parallel::run_parallel;
use crate::executor::types::{
    BatchContext, ExecutionRequest, ExecutionResponse, ExecutorCapabilities, ExecutorError,
    ExecutorKind,
};
use crate::graph::NodeId;

/// 执行后端（进程、Task 工具、MCP、进程内模拟等）
///
/// 编排器只依赖这个接口，不关心具体后端。
#[async_trait]
pub trait Executor: Send + Sync {
    fn kind(&self) -> ExecutorKind;

    /// 后端名称（唯一标识）
    fn name(&self) -> &str;

    /// 执行单个请求
    ///
    /// 任务本身失败时返回 `success == false` 的响应；`Err` 只表示后端无法给出响应。
    async fn execute(
        &self,
        request: ExecutionRequest,
        batch: &BatchContext,
    ) -> Result<ExecutionResponse, ExecutorError>;

    /// 并发执行一批请求
    ///
    /// 默认实现：信号量限流、逐请求超时、响应取消令牌。
    async fn execute_parallel(
        &self,
        requests: Vec<ExecutionRequest>,
        batch: &BatchContext,
    ) -> Result<HashMap<NodeId, ExecutionResponse>, ExecutorError> {
        Ok(run_parallel(self, requests, batch).await)
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn capabilities(&self) -> ExecutorCapabilities {
        ExecutorCapabilities::default()
    }

    /// 释放后端资源
    async fn cleanup(&self) -> Result<(), ExecutorError> {
        Ok(())
    }
}
