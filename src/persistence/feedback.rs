//! 模拟反馈：在没有真实投放结果时，由行为指标推算一组结果，闭合学习回路

use serde::{Deserialize, Serialize};

use crate::scoring::round_cents;
use crate::strategy::BehaviorMetrics;

/// 每个线索的基准成本（ROAS 为 1 时）
const BASE_COST_PER_LEAD: f64 = 10.0;
/// 线索到转化的模拟比例
const LEAD_CONVERSION_RATIO: f64 = 0.3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulatedFeedback {
    pub total_leads: u64,
    pub total_conversions: u64,
    pub total_cost: f64,
    /// 转化 / 线索（4 位小数）
    pub response_rate: f64,
    /// response_rate 的百分比形式（2 位小数）
    pub conversion_rate: f64,
    pub avg_cost_per_lead: f64,
}

/// 缺失指标按 ROAS 1、转化率 1%、点击 10 处理
pub fn simulate_feedback(behavior: &BehaviorMetrics) -> SimulatedFeedback {
    let roas = behavior.expected_roas.unwrap_or(1.0);
    let cvr = behavior.conversion_rate.unwrap_or(1.0);
    let clicks = behavior.click_volume.unwrap_or(10) as f64;

    let total_leads = ((clicks * (cvr / 100.0)).floor() as u64).max(1);
    let total_conversions = (total_leads as f64 * LEAD_CONVERSION_RATIO).floor() as u64;
    let total_cost = round_cents(total_leads as f64 * (BASE_COST_PER_LEAD / roas.max(0.1)));

    let rate = total_conversions as f64 / total_leads as f64;
    SimulatedFeedback {
        total_leads,
        total_conversions,
        total_cost,
        response_rate: (rate * 10_000.0).round() / 10_000.0,
        conversion_rate: round_cents(rate * 100.0),
        avg_cost_per_lead: round_cents(total_cost / total_leads as f64),
    }
}
