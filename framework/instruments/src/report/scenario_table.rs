use tabled::Tabled;

#[derive(Tabled)]
pub struct ScenarioRow {
    pub scenario: String,
    pub total: u64,
    pub success: u64,
    pub check_failure: u64,
    pub execution_error: u64,
    pub timeout: u64,
    pub dropped: u64,
    #[tabled(display = "float2")]
    pub avg_ms: f64,
    #[tabled(display = "float2")]
    pub p95_ms: f64,
    #[tabled(display = "float2")]
    pub max_ms: f64,
    #[tabled(display = "float2")]
    pub req_avg_ms: f64,
    #[tabled(display = "float2")]
    pub req_p95_ms: f64,
    #[tabled(display = "float2")]
    pub max_lag_ms: f64,
}

#[derive(Tabled)]
pub struct CheckRow {
    pub scenario: String,
    pub check: String,
    pub passes: u64,
    pub fails: u64,
    #[tabled(display = "percent")]
    pub pass_rate: f64,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}

fn percent(n: &f64) -> String {
    format!("{:.2}%", n * 100.0)
}
