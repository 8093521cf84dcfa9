// API 处理器
// 插件宿主的核心是同步的，处理器通过 web::block 在阻塞线程池中调用

pub mod connectors;
pub mod sessions;

use actix_web::web;

use crate::errors::DataFetchResult;
use crate::logging::OperationContext;

/// 在阻塞线程池中执行宿主操作，并把日志挂到操作上下文的 span 下
pub(crate) async fn run_blocking<F, R>(context: &OperationContext, operation: F) -> DataFetchResult<R>
where
    F: FnOnce() -> DataFetchResult<R> + Send + 'static,
    R: Send + 'static,
{
    let span = context.span();
    let result = web::block(move || span.in_scope(operation)).await?;
    context.finish();
    result
}
