use std::fmt;
use std::time::Duration;

use console::{measure_text_width, style};
use csm_dashboard_shared::csm::{ApyMetrics, HealthStatus, OperatorDetails, OperatorRewards, WithdrawalEvent};

use crate::utils::format_thousands;

pub struct Console;

impl Console {
    const fn get_width() -> usize {
        60
    }

    pub fn title(text: &str) {
        println!();
        let width = Self::get_width();
        let border = "═".repeat(width);
        println!("{}", style(format!("╔{border}╗")).magenta().bold());
        println!("{}", style(format!("║{text:^width$}║")).magenta().bold());
        println!("{}", style(format!("╚{border}╝")).magenta().bold());
    }

    pub fn info(label: &str, value: &str) {
        println!("{}: {}", style(label).dim().magenta(), style(value).white());
    }

    pub fn success(text: &str) {
        println!("{} {}", style("✓").green().bold(), style(text).green());
    }

    pub fn warning(text: &str) {
        println!("{} {}", style("⚠").yellow().bold(), style(text).yellow());
    }

    pub fn error(text: &str) {
        eprintln!("{} {}", style("✗").red().bold(), style(text).red());
    }

    pub fn spinner(text: &str) -> indicatif::ProgressBar {
        let pb = indicatif::ProgressBar::new_spinner();
        // Template is a literal, parsing it cannot fail
        pb.set_style(
            indicatif::ProgressStyle::default_spinner()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
                .template("{spinner:.magenta} {msg}")
                .unwrap(),
        );
        pb.set_message(text.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

/// Box-drawn table. Column widths follow the widest cell, styled text included.
pub struct Table {
    title: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(title: &str, headers: &[&str]) -> Self {
        Self {
            title: title.to_owned(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row<S: Into<String>>(mut self, cells: impl IntoIterator<Item = S>) -> Self {
        self.rows.push(cells.into_iter().map(Into::into).collect());
        self
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| measure_text_width(h)).collect();
        for row in &self.rows {
            for (idx, cell) in row.iter().enumerate() {
                let width = measure_text_width(cell);
                match widths.get_mut(idx) {
                    Some(current) => *current = (*current).max(width),
                    None => widths.push(width),
                }
            }
        }
        widths
    }
}

fn pad(cell: &str, width: usize) -> String {
    let padding = width.saturating_sub(measure_text_width(cell));
    format!("{cell}{}", " ".repeat(padding))
}

fn border(widths: &[usize], left: &str, mid: &str, right: &str) -> String {
    let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
    format!("{left}{}{right}", segments.join(mid))
}

fn line(cells: &[String], widths: &[usize]) -> String {
    let padded: Vec<String> = widths
        .iter()
        .enumerate()
        .map(|(idx, width)| pad(cells.get(idx).map(String::as_str).unwrap_or(""), *width))
        .collect();
    format!("│ {} │", padded.join(" │ "))
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.column_widths();
        writeln!(f, "{}", style(&self.title).bold().cyan())?;
        writeln!(f, "{}", border(&widths, "┌", "┬", "┐"))?;
        writeln!(f, "{}", line(&self.headers, &widths))?;
        writeln!(f, "{}", border(&widths, "├", "┼", "┤"))?;
        for row in &self.rows {
            writeln!(f, "{}", line(row, &widths))?;
        }
        write!(f, "{}", border(&widths, "└", "┴", "┘"))
    }
}

pub fn eth(value: f64) -> String {
    format!("{value:.6} ETH")
}

pub fn shares(value: u128) -> String {
    format_thousands(value)
}

fn percent(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}%")).unwrap_or_else(|| "-".to_owned())
}

fn optional_eth(value: Option<f64>) -> String {
    value.map(eth).unwrap_or_else(|| "-".to_owned())
}

fn yes_no(ok: bool) -> String {
    if ok {
        style("OK").green().to_string()
    } else {
        style("ATTENTION").red().bold().to_string()
    }
}

pub fn validators_table(rewards: &OperatorRewards) -> Table {
    Table::new("Validators", &["Total", "Active", "Exited"]).row([
        rewards.total_validators.to_string(),
        rewards.active_validators.to_string(),
        rewards.exited_validators.to_string(),
    ])
}

pub fn earnings_table(rewards: &OperatorRewards) -> Table {
    let bond = &rewards.bond;
    Table::new("Earnings", &["Item", "Shares", "ETH"])
        .row(["Current Bond".to_owned(), String::new(), eth(bond.current_bond_eth())])
        .row(["Required Bond".to_owned(), String::new(), eth(bond.required_bond_eth())])
        .row([
            "Excess Bond".to_owned(),
            String::new(),
            style(eth(bond.excess_bond_eth())).green().to_string(),
        ])
        .row([
            "Cumulative Rewards".to_owned(),
            shares(rewards.cumulative_rewards_shares),
            eth(rewards.cumulative_rewards_eth),
        ])
        .row([
            "Already Distributed".to_owned(),
            shares(rewards.distributed_shares),
            eth(rewards.distributed_eth),
        ])
        .row([
            "Unclaimed Rewards".to_owned(),
            shares(rewards.unclaimed_shares),
            style(eth(rewards.unclaimed_eth)).green().to_string(),
        ])
        .row([
            style("TOTAL CLAIMABLE").bold().to_string(),
            String::new(),
            style(eth(rewards.total_claimable_eth)).green().bold().to_string(),
        ])
}

pub fn status_table(details: &OperatorDetails) -> Table {
    details
        .validators_by_status
        .iter()
        .fold(Table::new("Validator Status", &["Status", "Count"]), |table, (status, count)| {
            table.row([status.clone(), count.to_string()])
        })
}

pub fn health_table(health: &HealthStatus) -> Table {
    Table::new("Health", &["Check", "Value", "Status"])
        .row([
            "Bond".to_owned(),
            format!("deficit {}", eth(health.bond_deficit_eth)),
            yes_no(health.bond_healthy),
        ])
        .row([
            "Stuck validators".to_owned(),
            health.stuck_validators_count.to_string(),
            yes_no(health.stuck_validators_count == 0),
        ])
        .row([
            "Slashed validators".to_owned(),
            health.slashed_validators_count.to_string(),
            yes_no(health.slashed_validators_count == 0),
        ])
        .row([
            "At-risk validators".to_owned(),
            health.validators_at_risk_count.to_string(),
            yes_no(health.validators_at_risk_count == 0),
        ])
        .row([
            "Strikes".to_owned(),
            format!(
                "{} on {} validators (max {})",
                health.strikes.total_strikes, health.strikes.total_validators_with_strikes, health.strikes.max_strikes
            ),
            yes_no(health.strikes.validators_at_risk == 0),
        ])
        .row([
            "Near ejection".to_owned(),
            health.strikes.validators_near_ejection.to_string(),
            yes_no(health.strikes.validators_near_ejection == 0),
        ])
}

pub fn withdrawals_table(withdrawals: &[WithdrawalEvent]) -> Table {
    withdrawals.iter().fold(
        Table::new("Withdrawals", &["Date", "Block", "Shares", "ETH", "Transaction"]),
        |table, withdrawal| {
            table.row([
                withdrawal
                    .timestamp
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                withdrawal.block_number.to_string(),
                shares(withdrawal.shares),
                eth(withdrawal.eth_value),
                withdrawal.tx_hash.to_string(),
            ])
        },
    )
}

pub fn apy_table(apy: &ApyMetrics) -> Table {
    Table::new("APY", &["Metric", "Previous", "Current", "Lifetime"])
        .row([
            "Reward APY".to_owned(),
            percent(apy.previous_distribution_apy),
            percent(apy.current_distribution_apy),
            percent(apy.reward_apy_ltd),
        ])
        .row([
            "Bond APY".to_owned(),
            percent(apy.bond_apy),
            percent(apy.bond_apy),
            percent(apy.bond_apy),
        ])
        .row([
            "Net APY".to_owned(),
            percent(apy.previous_net_apy),
            percent(apy.net_apy_28d),
            percent(apy.net_apy_ltd),
        ])
        .row([
            "Rewards".to_owned(),
            optional_eth(apy.previous_distribution_eth),
            optional_eth(apy.current_distribution_eth),
            optional_eth(apy.lifetime_distribution_eth),
        ])
        .row([
            "Bond rebase".to_owned(),
            optional_eth(apy.previous_bond_eth),
            optional_eth(apy.current_bond_eth),
            optional_eth(apy.lifetime_bond_eth),
        ])
        .row([
            "Net total".to_owned(),
            optional_eth(apy.previous_net_total_eth),
            optional_eth(apy.current_net_total_eth),
            optional_eth(apy.lifetime_net_total_eth),
        ])
}

pub fn history_table(apy: &ApyMetrics) -> Option<Table> {
    let frames = apy.frames.as_ref()?;
    let table = frames.iter().fold(
        Table::new("Distribution History", &["Frame", "Start", "End", "Days", "Rewards", "APY"]),
        |table, frame| {
            table.row([
                frame.frame_number.to_string(),
                frame.start_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
                frame.end_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
                format!("{:.1}", frame.duration_days),
                eth(frame.distributed_eth),
                percent(frame.apy),
            ])
        },
    );
    Some(table)
}

pub fn print_operator(rewards: &OperatorRewards) {
    Console::title(&format!("CSM Operator #{}", rewards.node_operator_id));
    Console::info("Manager address", &rewards.manager_address.to_string());
    Console::info("Reward address", &rewards.reward_address.to_string());
    match rewards.proof_valid {
        Some(true) => Console::success("Rewards tree entry matches the on-chain root"),
        Some(false) => Console::warning("Rewards tree entry does not match the on-chain root"),
        None => {}
    }
    println!();
    println!("{}", validators_table(rewards));
    println!();
    println!("{}", earnings_table(rewards));

    if let Some(details) = &rewards.details {
        print_details(details);
    }
    if let Some(withdrawals) = &rewards.withdrawals {
        println!();
        if withdrawals.is_empty() {
            Console::info("Withdrawals", "none found");
        } else {
            println!("{}", withdrawals_table(withdrawals));
        }
    }
}

fn print_details(details: &OperatorDetails) {
    if let Some(active_since) = details.active_since {
        println!();
        Console::info("Active since", &active_since.format("%Y-%m-%d").to_string());
    }
    if !details.validators_by_status.is_empty() {
        println!();
        println!("{}", status_table(details));
    }
    println!();
    println!("{}", health_table(&details.health));
    if let Some(effectiveness) = details.avg_effectiveness {
        Console::info("Attestation effectiveness", &percent(Some(effectiveness)));
    }
    if let Some(apy) = &details.apy {
        println!();
        println!("{}", apy_table(apy));
        if let Some(next) = apy.next_distribution_date {
            Console::info(
                "Next distribution",
                &format!(
                    "{} (est. {})",
                    next.format("%Y-%m-%d"),
                    optional_eth(apy.next_distribution_est_eth)
                ),
            );
        }
        if let Some(history) = history_table(apy) {
            println!();
            println!("{history}");
        }
    }
}
