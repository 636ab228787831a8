use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 接口板类型：MT2=1, MIO=2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum InterfaceBoardType {
    Mt2,
    Mio,
}

impl TryFrom<i64> for InterfaceBoardType {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(InterfaceBoardType::Mt2),
            2 => Ok(InterfaceBoardType::Mio),
            other => Err(format!("unknown interface board type: {}", other)),
        }
    }
}

impl From<InterfaceBoardType> for i64 {
    fn from(value: InterfaceBoardType) -> Self {
        match value {
            InterfaceBoardType::Mt2 => 1,
            InterfaceBoardType::Mio => 2,
        }
    }
}

/// 接口板
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceBoard {
    pub id: i64,
    pub ib_type: InterfaceBoardType,
    pub ib_addr: i64,
    pub name: String,
    pub enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInterfaceBoard {
    pub ib_type: InterfaceBoardType,
    pub ib_addr: i64,
    #[serde(default)]
    pub name: String,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterfaceBoardPatch {
    pub name: Option<String>,
    pub enabled: Option<bool>,
}

/// 控制器全局属性
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ControllerProp {
    pub controller_name: String,
    pub bp_type: i64,
    pub product_type: i64,
    pub is_double_line: bool,
    pub is_ownsa: bool,
    pub is_bak_ctl: bool,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControllerPropPatch {
    pub controller_name: Option<String>,
    pub bp_type: Option<i64>,
    pub product_type: Option<i64>,
    pub is_double_line: Option<bool>,
    pub is_ownsa: Option<bool>,
    pub is_bak_ctl: Option<bool>,
}

impl ControllerPropPatch {
    pub fn apply(&self, prop: &mut ControllerProp) {
        if let Some(v) = &self.controller_name {
            prop.controller_name = v.clone();
        }
        if let Some(v) = self.bp_type {
            prop.bp_type = v;
        }
        if let Some(v) = self.product_type {
            prop.product_type = v;
        }
        if let Some(v) = self.is_double_line {
            prop.is_double_line = v;
        }
        if let Some(v) = self.is_ownsa {
            prop.is_ownsa = v;
        }
        if let Some(v) = self.is_bak_ctl {
            prop.is_bak_ctl = v;
        }
    }
}

/// 工厂设置（只有工厂账号可写）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorySetting {
    pub bp_type: i64,
    pub product_type: i64,
    pub is_double_line: bool,
    pub is_ownsa: bool,
    pub is_bak_ctl: bool,
}

impl From<&ControllerProp> for FactorySetting {
    fn from(prop: &ControllerProp) -> Self {
        Self {
            bp_type: prop.bp_type,
            product_type: prop.product_type,
            is_double_line: prop.is_double_line,
            is_ownsa: prop.is_ownsa,
            is_bak_ctl: prop.is_bak_ctl,
        }
    }
}

/// 开门请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorOpenRequest {
    pub ibaddr: i64,
    pub outputaddr: i64,
    #[serde(default)]
    pub mode: i64,
}

/// 消防复位请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FireCancelRequest {
    pub ibaddr: i64,
}

/// 校时请求，格式 `YYYY-MM-DD HH:MM:SS`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSyncRequest {
    pub datetime: String,
}

/// 设备后端的标准应答 `{"retcode": 200, "content": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayReply {
    pub retcode: i64,
    #[serde(default)]
    pub content: Value,
}

impl RelayReply {
    pub fn is_ok(&self) -> bool {
        self.retcode == 200
    }
}

pub type DoorOpenResult = RelayReply;
pub type FireCancelResult = RelayReply;

/// 单个校时步骤的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// 校时结果：系统时钟与硬件时钟分别报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSyncResult {
    pub datetime: String,
    pub system_clock: StepOutcome,
    pub hardware_clock: StepOutcome,
}

/// 数据同步类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// 人员、凭证等数据
    Data,
    /// 控制器配置
    Config,
}

impl SyncKind {
    pub fn form_value(self) -> &'static str {
        match self {
            SyncKind::Data => "1",
            SyncKind::Config => "3",
        }
    }
}
