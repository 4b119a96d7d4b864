//! 网关运行配置加载。

use std::env;
use std::time::Duration;

/// Analog Input 对象表的容量（同时对外暴露的通道上限）。
pub const MAX_CHANNELS: usize = 4;

/// 单次 Modbus 读保持/输入寄存器请求的数量上限。
pub const MAX_BATCH_SIZE: u16 = 125;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 网关运行配置。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub device_instance: u32,
    pub device_name: String,
    pub vendor_id: u16,
    pub bacnet_bind: String,
    pub bacnet_port: u16,
    pub bacnet_broadcast: String,
    pub bbmd_addr: Option<String>,
    pub bbmd_port: u16,
    pub bbmd_ttl_seconds: u16,
    pub receive_timeout_ms: u64,
    pub fine_tick_ms: u64,
    pub coarse_tick_seconds: u64,
    pub modbus_host: String,
    pub modbus_port: u16,
    pub modbus_unit_id: u8,
    pub modbus_function_code: u8,
    pub register_address: u16,
    pub batch_size: u16,
    pub channel_count: usize,
    pub channel_capacity: usize,
    pub poll_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub reconnect_max_attempts: u32,
    pub max_consecutive_read_failures: u32,
    pub shutdown_drain_timeout_ms: u64,
}

impl GatewayConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let device_instance = read_u32_with_default("GW_DEVICE_INSTANCE", 48)?;
        // BACnet 设备实例号为 22 位
        if device_instance >= 0x3F_FFFF {
            return Err(invalid("GW_DEVICE_INSTANCE", device_instance));
        }
        let device_name = env::var("GW_DEVICE_NAME").unwrap_or_else(|_| "gw-bridge".to_string());
        let vendor_id = read_u16_with_default("GW_VENDOR_ID", 260)?;
        let bacnet_bind = env::var("GW_BACNET_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
        let bacnet_port = read_u16_with_default("GW_BACNET_PORT", 0xBAC1)?;
        let bacnet_broadcast =
            env::var("GW_BACNET_BROADCAST").unwrap_or_else(|_| "255.255.255.255".to_string());
        let bbmd_addr = read_optional("GW_BBMD_ADDR");
        let bbmd_port = read_u16_with_default("GW_BBMD_PORT", 0xBAC0)?;
        let bbmd_ttl_seconds = read_u16_with_default("GW_BBMD_TTL_SECONDS", 90)?;
        if bbmd_ttl_seconds == 0 {
            return Err(invalid("GW_BBMD_TTL_SECONDS", bbmd_ttl_seconds));
        }
        let receive_timeout_ms = read_positive_u64("GW_RECEIVE_TIMEOUT_MS", 100)?;
        let fine_tick_ms = read_positive_u64("GW_FINE_TICK_MS", 1000)?;
        let coarse_tick_seconds = read_positive_u64("GW_COARSE_TICK_SECONDS", 60)?;

        let modbus_host = env::var("GW_MODBUS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let modbus_port = read_u16_with_default("GW_MODBUS_PORT", 502)?;
        let modbus_unit_id = read_u8_with_default("GW_MODBUS_UNIT_ID", 255)?;
        let modbus_function_code = read_u8_with_default("GW_MODBUS_FUNCTION_CODE", 3)?;
        if !matches!(modbus_function_code, 3 | 4) {
            return Err(invalid("GW_MODBUS_FUNCTION_CODE", modbus_function_code));
        }
        let register_address = read_u16_with_default("GW_REGISTER_ADDRESS", 48)?;
        let batch_size = read_u16_with_default("GW_BATCH_SIZE", 10)?;
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(invalid("GW_BATCH_SIZE", batch_size));
        }
        let channel_count = read_u64_with_default("GW_CHANNEL_COUNT", MAX_CHANNELS as u64)? as usize;
        if channel_count == 0 || channel_count > MAX_CHANNELS {
            return Err(invalid("GW_CHANNEL_COUNT", channel_count));
        }
        let channel_capacity = read_u64_with_default("GW_CHANNEL_CAPACITY", 256)? as usize;
        let poll_interval_ms = read_positive_u64("GW_POLL_INTERVAL_MS", 100)?;
        let connect_timeout_ms = read_positive_u64("GW_CONNECT_TIMEOUT_MS", 5000)?;
        let read_timeout_ms = read_positive_u64("GW_READ_TIMEOUT_MS", 3000)?;
        let reconnect_initial_ms = read_u64_with_default("GW_RECONNECT_INITIAL_MS", 500)?;
        let reconnect_max_ms = read_u64_with_default("GW_RECONNECT_MAX_MS", 30_000)?;
        let reconnect_max_attempts = read_u32_with_default("GW_RECONNECT_MAX_ATTEMPTS", 5)?;
        if reconnect_max_attempts == 0 {
            return Err(invalid("GW_RECONNECT_MAX_ATTEMPTS", reconnect_max_attempts));
        }
        let max_consecutive_read_failures =
            read_u32_with_default("GW_MAX_CONSECUTIVE_READ_FAILURES", 5)?;
        let shutdown_drain_timeout_ms = read_u64_with_default("GW_SHUTDOWN_DRAIN_TIMEOUT_MS", 2000)?;

        Ok(Self {
            device_instance,
            device_name,
            vendor_id,
            bacnet_bind,
            bacnet_port,
            bacnet_broadcast,
            bbmd_addr,
            bbmd_port,
            bbmd_ttl_seconds,
            receive_timeout_ms,
            fine_tick_ms,
            coarse_tick_seconds,
            modbus_host,
            modbus_port,
            modbus_unit_id,
            modbus_function_code,
            register_address,
            batch_size,
            channel_count,
            channel_capacity,
            poll_interval_ms,
            connect_timeout_ms,
            read_timeout_ms,
            reconnect_initial_ms,
            reconnect_max_ms,
            reconnect_max_attempts,
            max_consecutive_read_failures,
            shutdown_drain_timeout_ms,
        })
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn fine_tick(&self) -> Duration {
        Duration::from_millis(self.fine_tick_ms)
    }

    pub fn coarse_tick(&self) -> Duration {
        Duration::from_secs(self.coarse_tick_seconds)
    }

    pub fn shutdown_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_drain_timeout_ms)
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid(key.to_string(), value.to_string())
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_positive_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = read_u64_with_default(key, default)?;
    if value == 0 {
        return Err(invalid(key, value));
    }
    Ok(value)
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}
