use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Hour => "hour",
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(Period::Hour),
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            other => Err(format!("Unknown period: {}", other)),
        }
    }
}

/// Upstream query shape. Only `Latest` is time-ordered; the ranking
/// strategies surface items out of chronological order and overlap freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Strategy {
    Latest,
    TopAllTime,
    TopPeriod(Period),
    Trending,
}

impl Strategy {
    pub fn is_backfill(&self) -> bool {
        !matches!(self, Strategy::Latest)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Latest => f.write_str("latest"),
            Strategy::TopAllTime => f.write_str("top:all"),
            Strategy::TopPeriod(p) => write!(f, "top:{}", p.as_str()),
            Strategy::Trending => f.write_str("trending"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "latest" | "new" => Ok(Strategy::Latest),
            "top" | "top:all" => Ok(Strategy::TopAllTime),
            "trending" | "hot" => Ok(Strategy::Trending),
            other => match other.strip_prefix("top:") {
                Some(period) => period.parse().map(Strategy::TopPeriod),
                None => Err(format!(
                    "Unknown strategy: {}. Use latest, top:all, top:<period> or trending",
                    other
                )),
            },
        }
    }
}

impl TryFrom<String> for Strategy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Strategy> for String {
    fn from(value: Strategy) -> Self {
        value.to_string()
    }
}

/// One row of the backfill budget table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub strategy: Strategy,
    /// Fraction of the base budget this strategy may fetch.
    pub share: f64,
}

impl PlanStep {
    pub fn new(strategy: Strategy, share: f64) -> Self {
        Self { strategy, share }
    }

    pub fn budget(&self, base: usize) -> usize {
        // epsilon keeps 999 * (1/3) at 333
        ((base as f64) * self.share + 1e-9).floor().max(0.0) as usize
    }
}

/// All-time top first, then shrinking windows, then trending.
pub fn default_plan() -> Vec<PlanStep> {
    vec![
        PlanStep::new(Strategy::TopAllTime, 1.0),
        PlanStep::new(Strategy::TopPeriod(Period::Year), 1.0 / 3.0),
        PlanStep::new(Strategy::TopPeriod(Period::Month), 1.0 / 3.0),
        PlanStep::new(Strategy::TopPeriod(Period::Week), 1.0 / 3.0),
        PlanStep::new(Strategy::Trending, 0.5),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_round_trips_through_text() {
        for s in [
            Strategy::Latest,
            Strategy::TopAllTime,
            Strategy::TopPeriod(Period::Week),
            Strategy::Trending,
        ] {
            assert_eq!(s.to_string().parse::<Strategy>().unwrap(), s);
        }
    }

    #[test]
    fn test_strategy_aliases() {
        assert_eq!("hot".parse::<Strategy>().unwrap(), Strategy::Trending);
        assert_eq!("new".parse::<Strategy>().unwrap(), Strategy::Latest);
        assert_eq!("TOP".parse::<Strategy>().unwrap(), Strategy::TopAllTime);
        assert!("top:decade".parse::<Strategy>().is_err());
        assert!("rising".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_default_plan_budgets() {
        let budgets: Vec<usize> = default_plan().iter().map(|s| s.budget(1000)).collect();
        assert_eq!(budgets, vec![1000, 333, 333, 333, 500]);

        let budgets: Vec<usize> = default_plan().iter().map(|s| s.budget(999)).collect();
        assert_eq!(budgets, vec![999, 333, 333, 333, 499]);
    }

    #[test]
    fn test_plan_step_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            plan: Vec<PlanStep>,
        }

        let content = r#"
[[plan]]
strategy = "top:year"
share = 0.25

[[plan]]
strategy = "hot"
share = 1.0
"#;
        let w: Wrapper = toml::from_str(content).unwrap();
        assert_eq!(w.plan[0].strategy, Strategy::TopPeriod(Period::Year));
        assert_eq!(w.plan[1].strategy, Strategy::Trending);
        assert_eq!(w.plan[0].budget(100), 25);
    }
}
