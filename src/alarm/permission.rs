//! 权限闸门：引擎启动前请求/校验系统通知权限
//!
//! - Android API < 33 无需运行时权限，直接放行
//! - Android 13+：先 check，未授权再弹窗；「不再询问」视为不可再问
//! - iOS：直接请求，拒绝后仍可在系统设置中开启
//!
//! 任何适配器错误都记日志并视为拒绝且不可再问。

use serde::{Deserialize, Serialize};

use crate::alarm::adapter::{AlarmAdapter, PermissionResponse};

/// 运行平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Android,
    #[default]
    Ios,
}

/// 引入 POST_NOTIFICATIONS 运行时权限的 Android API level
pub const ANDROID_RUNTIME_PERMISSION_API: u32 = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionResult {
    pub granted: bool,
    pub can_ask_again: bool,
}

impl PermissionResult {
    const GRANTED: Self = Self {
        granted: true,
        can_ask_again: true,
    };
    const BLOCKED: Self = Self {
        granted: false,
        can_ask_again: false,
    };
}

#[derive(Debug, Clone, Copy)]
pub struct PermissionGate {
    platform: Platform,
    android_api_level: u32,
}

impl PermissionGate {
    pub fn new(platform: Platform, android_api_level: u32) -> Self {
        Self {
            platform,
            android_api_level,
        }
    }

    pub async fn request(&self, adapter: &dyn AlarmAdapter) -> PermissionResult {
        match self.platform {
            Platform::Android => self.request_android(adapter).await,
            Platform::Ios => self.request_ios(adapter).await,
        }
    }

    async fn request_android(&self, adapter: &dyn AlarmAdapter) -> PermissionResult {
        if self.android_api_level < ANDROID_RUNTIME_PERMISSION_API {
            return PermissionResult::GRANTED;
        }

        match adapter.check_permission().await {
            Ok(true) => return PermissionResult::GRANTED,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Failed to check Android notification permission: {}", e);
                return PermissionResult::BLOCKED;
            }
        }

        match adapter.request_permission().await {
            Ok(PermissionResponse::Granted) => PermissionResult::GRANTED,
            Ok(PermissionResponse::NeverAskAgain) => PermissionResult::BLOCKED,
            Ok(PermissionResponse::Denied) => PermissionResult {
                granted: false,
                can_ask_again: true,
            },
            Err(e) => {
                tracing::warn!("Failed to request Android notification permission: {}", e);
                PermissionResult::BLOCKED
            }
        }
    }

    async fn request_ios(&self, adapter: &dyn AlarmAdapter) -> PermissionResult {
        if !adapter.is_available() {
            return PermissionResult::BLOCKED;
        }
        match adapter.request_permission().await {
            Ok(PermissionResponse::Granted) => PermissionResult {
                granted: true,
                can_ask_again: false,
            },
            Ok(PermissionResponse::Denied) => PermissionResult {
                granted: false,
                can_ask_again: true,
            },
            Ok(PermissionResponse::NeverAskAgain) => PermissionResult::BLOCKED,
            Err(e) => {
                tracing::warn!("Failed to request iOS notification permission: {}", e);
                PermissionResult::BLOCKED
            }
        }
    }
}
