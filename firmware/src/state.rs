//! グローバル共有状態管理
//!
//! 制御タスクと他タスクの間の指令・ステータスを保持します。

use bldc_six_step::CommandChannel;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// 制御ループへの指令メールボックス（ステータス公開を含む）
///
/// 割り込みからのフォルト通知にも使うためCriticalSectionRawMutexで保護
pub static COMMANDS: CommandChannel<CriticalSectionRawMutex> = CommandChannel::new();
