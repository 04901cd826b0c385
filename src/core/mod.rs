//! Core module - platform-independent pipeline logic

pub mod ad_stage;
pub mod constants;
pub mod io_traits;
pub mod protocol;
pub mod renderer;
pub mod reveal_gate;
pub mod ticket;
pub mod timer;
pub mod types;
pub mod view;
pub mod watchdog;

pub use ad_stage::{AdStage, AdStageConfig, AdStageController, AdStageId, StageEvent};
pub use io_traits::{ScanClient, ScanResponseReceiver, ScanSender};
pub use protocol::{parse_scan_response, PrizeInfo, ScanSuccess, TicketRow};
pub use renderer::{RenderError, RenderSummary, ResultRenderer};
pub use reveal_gate::{
    ForceReason, GateConfig, GateEvent, GatePhase, GateState, GateStatus, RevealGate,
};
pub use ticket::{StagedTicket, TicketError};
pub use types::{Epoch, FailureKind, ScanFailure, ScanRequest, ScanResponse, ScanResult};
pub use view::{Element, PageView, ResultNode, UserIntent, ViewError};
pub use watchdog::{RecoveryWatchdog, StallReport};
