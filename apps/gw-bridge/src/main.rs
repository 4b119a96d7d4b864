//! Modbus TCP → BACnet/IP 值缓存网关进程。

mod gateway;
mod read_consumer;

use gateway::Gateway;
use gw_config::GatewayConfig;
use gw_protocol::{ModbusFunctionCode, ModbusTcpConfig, ModbusTcpConnector};
use gw_telemetry::{init_tracing, metrics};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = GatewayConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    // Modbus TCP 采集源
    let connector = ModbusTcpConnector::new(ModbusTcpConfig {
        host: config.modbus_host.clone(),
        port: config.modbus_port,
        unit_id: config.modbus_unit_id,
        function_code: ModbusFunctionCode::try_from(config.modbus_function_code)?,
        connect_timeout_ms: config.connect_timeout_ms,
        read_timeout_ms: config.read_timeout_ms,
    });

    let gateway = Gateway::start(&config, Arc::new(connector)).await?;

    info!(target: "gw.bridge", local = %gateway.local_addr(), "waiting_for_shutdown_signal");
    tokio::signal::ctrl_c().await?;
    info!(target: "gw.bridge", "shutdown_requested");

    let report = gateway.shutdown().await;
    info!(
        target: "gw.bridge",
        drained_channels = report.drained_channels,
        discarded_readings = report.discarded_readings,
        metrics = %metrics().snapshot().to_json(),
        "gateway_metrics"
    );
    Ok(())
}
