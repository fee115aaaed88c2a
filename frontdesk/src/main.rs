use std::sync::Arc;

use frontdesk::{
    BackgroundTasks, FrontDesk, RoomRegistry, StaticRoomRegistry, TaskKind, print_banner,
    setup_environment,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 设置环境 (dotenv, 工作目录, 日志)
    let config = setup_environment()?;

    print_banner();
    tracing::info!(environment = %config.environment, "Front desk starting...");

    // 2. 加载房间注册表
    let rooms_path = config.rooms_path();
    let rooms: Arc<dyn RoomRegistry> = match StaticRoomRegistry::from_json_file(&rooms_path) {
        Ok(registry) => {
            tracing::info!(rooms = registry.len(), "Room registry loaded");
            Arc::new(registry)
        }
        Err(e) => {
            tracing::warn!(
                path = %rooms_path.display(),
                "No room registry loaded, any room number is accepted: {e}"
            );
            Arc::new(StaticRoomRegistry::default())
        }
    };

    // 3. 打开会话
    let desk = FrontDesk::open(config, rooms)?;

    // 4. 后台任务
    let mut tasks = BackgroundTasks::new();

    let startup = desk.clone();
    tasks.spawn("initial_sync", TaskKind::Warmup, async move {
        let status = startup.start_sync().await;
        tracing::info!(status = ?status, "Initial sync finished");
    });

    let mut status_rx = desk.sync_status();
    let shutdown = tasks.shutdown_token();
    tasks.spawn("sync_status", TaskKind::Listener, async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = status_rx.borrow_and_update().clone();
                    tracing::debug!(
                        status = ?state.status,
                        last_synced_at = ?state.last_synced_at,
                        "Sync status"
                    );
                }
            }
        }
    });
    tasks.log_summary();

    // 5. 等待退出信号
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    desk.close().await;
    tasks.shutdown().await;
    Ok(())
}
