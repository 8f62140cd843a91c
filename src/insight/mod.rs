//! 洞察：从投放明细中找出表现最好的人群细分
//!
//! 按 (年龄段, 性别) 分组，汇总花费 / 收入 / 量级指标并对逐行 ROAS 取均值；
//! 量级指标不超过 10 的分组不具显著性，直接忽略；胜出者为平均 ROAS 最高的分组（并列取先出现者）。

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::EngineError;
use crate::scoring::round_cents;

/// 最低显著性：分组量级指标必须大于此值
pub const MIN_SEGMENT_VOLUME: f64 = 10.0;

/// 一行投放明细
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub age_range: String,
    pub gender: String,
    #[serde(default)]
    pub spend: f64,
    #[serde(default)]
    pub revenue: f64,
    #[serde(default)]
    pub clicks: f64,
    #[serde(default)]
    pub impressions: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversions: Option<f64>,
}

impl CampaignRecord {
    pub fn roas(&self) -> f64 {
        if self.spend > 0.0 {
            self.revenue / self.spend
        } else {
            0.0
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentDemographics {
    pub age_range: String,
    pub gender: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub roas: f64,
    pub total_spend: f64,
    pub volume_metric: u64,
}

/// 分析步骤的输出：生成器的唯一输入
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub top_demographics: SegmentDemographics,
    pub performance_metrics: PerformanceMetrics,
    pub insight_text: String,
}

impl Insight {
    /// 人口画像是否足以构造候选（含降级候选）
    pub fn has_demographics(&self) -> bool {
        !self.top_demographics.age_range.trim().is_empty()
            && !self.top_demographics.gender.trim().is_empty()
    }
}

#[derive(Default)]
struct SegmentTotals {
    spend: f64,
    revenue: f64,
    volume: f64,
    roas_sum: f64,
    rows: usize,
}

/// 找出 ROAS 最好的细分人群
pub fn find_winning_segment(records: &[CampaignRecord]) -> Result<Insight, EngineError> {
    let use_conversions = records.iter().any(|r| r.conversions.is_some());

    // 保持首次出现的顺序，并列时取先出现者
    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), SegmentTotals> = HashMap::new();
    for record in records {
        let key = (record.age_range.clone(), record.gender.clone());
        let totals = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            SegmentTotals::default()
        });
        totals.spend += record.spend;
        totals.revenue += record.revenue;
        totals.volume += if use_conversions {
            record.conversions.unwrap_or(0.0)
        } else {
            record.clicks
        };
        totals.roas_sum += record.roas();
        totals.rows += 1;
    }

    let mut best: Option<(&(String, String), &SegmentTotals, f64)> = None;
    for key in &order {
        let totals = &groups[key];
        if totals.volume <= MIN_SEGMENT_VOLUME {
            continue;
        }
        let mean_roas = totals.roas_sum / totals.rows as f64;
        if best.map_or(true, |(_, _, r)| mean_roas > r) {
            best = Some((key, totals, mean_roas));
        }
    }

    let Some(((age_range, gender), totals, mean_roas)) = best else {
        return Err(EngineError::Analysis(
            "no segment reached the minimum significance volume".to_string(),
        ));
    };

    let roas = round_cents(mean_roas);
    let insight = Insight {
        top_demographics: SegmentDemographics {
            age_range: age_range.clone(),
            gender: gender.clone(),
        },
        performance_metrics: PerformanceMetrics {
            roas,
            total_spend: round_cents(totals.spend),
            volume_metric: totals.volume as u64,
        },
        insight_text: format!(
            "O segmento {} de {} teve o melhor desempenho com ROAS de {}.",
            gender, age_range, roas
        ),
    };
    tracing::info!("Winning segment: {}", insight.insight_text);
    Ok(insight)
}

/// 从 JSON 文件读取明细（记录数组）
pub fn load_records(path: &Path) -> Result<Vec<CampaignRecord>, EngineError> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// 内置演示数据（无数据文件时使用）
pub fn demo_records() -> Vec<CampaignRecord> {
    let rows = [
        ("25-34", "F", 100.0, 100.0, 80.0, 2000.0, 2.0),
        ("25-34", "F", 150.0, 150.0, 120.0, 3000.0, 3.0),
        ("35-44", "M", 50.0, 500.0, 90.0, 1500.0, 15.0),
        ("18-24", "F", 50.0, 25.0, 40.0, 1000.0, 1.0),
    ];
    rows.iter()
        .map(
            |&(age, gender, spend, revenue, clicks, impressions, conversions)| CampaignRecord {
                age_range: age.to_string(),
                gender: gender.to_string(),
                spend,
                revenue,
                clicks,
                impressions,
                conversions: Some(conversions),
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_records_pick_male_35_44() {
        let insight = find_winning_segment(&demo_records()).unwrap();
        assert_eq!(insight.top_demographics.age_range, "35-44");
        assert_eq!(insight.top_demographics.gender, "M");
        assert_eq!(insight.performance_metrics.roas, 10.0);
        assert_eq!(insight.performance_metrics.volume_metric, 15);
        assert!(insight.insight_text.contains("ROAS de 10"));
    }

    #[test]
    fn test_insufficient_volume_is_an_error() {
        let records = vec![CampaignRecord {
            age_range: "18-24".into(),
            gender: "F".into(),
            spend: 10.0,
            revenue: 50.0,
            clicks: 8.0,
            ..Default::default()
        }];
        assert!(matches!(
            find_winning_segment(&records),
            Err(EngineError::Analysis(_))
        ));
    }

    #[test]
    fn test_clicks_used_when_no_conversions() {
        let records = vec![
            CampaignRecord {
                age_range: "25-34".into(),
                gender: "F".into(),
                spend: 100.0,
                revenue: 300.0,
                clicks: 50.0,
                ..Default::default()
            },
            CampaignRecord {
                age_range: "45-54".into(),
                gender: "M".into(),
                spend: 0.0,
                revenue: 100.0,
                clicks: 500.0,
                ..Default::default()
            },
        ];
        let insight = find_winning_segment(&records).unwrap();
        assert_eq!(insight.top_demographics.age_range, "25-34");
        assert_eq!(insight.performance_metrics.volume_metric, 50);
        assert!(insight.has_demographics());
    }
}
