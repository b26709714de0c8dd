use std::sync::OnceLock;

use tokio::task::JoinHandle;

/// Returns the ambient tokio runtime handle, or the shared fallback runtime.
///
/// Coordination threads in editor frontends usually run outside any runtime;
/// jobs submitted from there land on one process-wide runtime.
pub fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("xeno-worker-global")
			.build()
			.expect("failed to build xeno-worker global tokio runtime")
	});
	runtime.handle().clone()
}

/// Spawns blocking work tagged with the submitting pool's name.
pub fn spawn_blocking<F, R>(pool: &'static str, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(worker_pool = pool, "worker.spawn_blocking");
	runtime_handle().spawn_blocking(f)
}
