use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::blockchain::normalize_address;
use crate::config::MixerConfig;
use crate::error::AnalysisError;
use crate::table::RecordTable;

/// Asset a flow moves; amounts are only compared within one asset
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Token,
    Native,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MixerCandidate {
    pub address: String,
    pub asset: Asset,
    pub window_start: u64,
    pub window_end: u64,
    pub distinct_senders: usize,
    pub incoming_count: usize,
    pub incoming_total: Decimal,
    pub outgoing_count: usize,
    pub outgoing_total: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct KnownMixerHit {
    pub address: String,
    pub as_sender: u64,
    pub as_receiver: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MixerReport {
    pub candidates: Vec<MixerCandidate>,
    pub known_mixer_hits: Vec<KnownMixerHit>,
}

#[derive(Debug, Clone, Copy)]
struct Flow<'a> {
    counterparty: &'a str,
    amount: Decimal,
    timestamp: u64,
}

/// Incoming and outgoing flows of every address for one asset
#[derive(Default)]
struct Ledger<'a> {
    incoming: BTreeMap<&'a str, Vec<Flow<'a>>>,
    outgoing: BTreeMap<&'a str, Vec<Flow<'a>>>,
}

impl<'a> Ledger<'a> {
    fn record(&mut self, from: &'a str, to: &'a str, amount: Decimal, timestamp: u64) {
        if from == to || amount <= Decimal::ZERO {
            return;
        }
        self.incoming.entry(to).or_default().push(Flow {
            counterparty: from,
            amount,
            timestamp,
        });
        self.outgoing.entry(from).or_default().push(Flow {
            counterparty: to,
            amount,
            timestamp,
        });
    }

    fn sort(&mut self) {
        for flows in self.incoming.values_mut().chain(self.outgoing.values_mut()) {
            flows.sort_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.counterparty.cmp(b.counterparty))
                    .then_with(|| a.amount.cmp(&b.amount))
            });
        }
    }
}

fn validate(params: &MixerConfig) -> Result<(), AnalysisError> {
    let invalid = |name: &str, value: String| AnalysisError::InvalidParameter {
        name: format!("mixer.{}", name),
        value,
    };
    if params.min_distinct_senders == 0 {
        return Err(invalid("min_distinct_senders", "0".to_string()));
    }
    if params.window_secs == 0 {
        return Err(invalid("window_secs", "0".to_string()));
    }
    if params.max_outgoing == 0 {
        return Err(invalid("max_outgoing", "0".to_string()));
    }
    if params.min_outflow_ratio < Decimal::ZERO {
        return Err(invalid("min_outflow_ratio", params.min_outflow_ratio.to_string()));
    }
    Ok(())
}

/// Flag addresses that collect from many senders and pay out in a few
/// large transfers shortly after.
///
/// An address is flagged when some window `[t0, t0 + W]` opened by one of
/// its inflows holds inflows from at least `M` distinct senders, and the
/// outflows after the last of those inflows up to `t0 + 2W` number between
/// 1 and `P` and sum to at least `R` times the inflow total. Each address is
/// reported at most once per asset, for its earliest qualifying window.
/// Flow totals too large for a decimal make the query unavailable.
pub fn mixer_candidates(
    table: &RecordTable,
    params: &MixerConfig,
    known_mixers: &[String],
) -> Result<MixerReport, AnalysisError> {
    validate(params)?;

    let mut token = Ledger::default();
    let mut native = Ledger::default();
    for row in table.rows() {
        if let Some(transfer) = &row.transfer {
            if let Some(amount) = transfer.amount {
                token.record(&transfer.from, &transfer.to, amount, row.timestamp);
            }
        }
    }
    for row in table.transactions() {
        if let Some(to) = &row.tx_to {
            native.record(&row.tx_from, to, row.value_eth, row.timestamp);
        }
    }
    token.sort();
    native.sort();

    let mut candidates = scan(&token, Asset::Token, params)?;
    candidates.extend(scan(&native, Asset::Native, params)?);
    candidates.sort_by(|a, b| a.address.cmp(&b.address).then_with(|| a.asset.cmp(&b.asset)));

    Ok(MixerReport {
        candidates,
        known_mixer_hits: known_mixer_hits(table, known_mixers),
    })
}

fn total(flows: &[&Flow]) -> Result<Decimal, AnalysisError> {
    flows
        .iter()
        .try_fold(Decimal::ZERO, |total, flow| total.checked_add(flow.amount))
        .ok_or_else(|| AnalysisError::InsufficientData("mixer flow total exceeds decimal range".to_string()))
}

fn scan(ledger: &Ledger<'_>, asset: Asset, params: &MixerConfig) -> Result<Vec<MixerCandidate>, AnalysisError> {
    let window = params.window_secs;
    let mut candidates = Vec::new();

    for (address, incoming) in &ledger.incoming {
        let outgoing = match ledger.outgoing.get(address) {
            Some(outgoing) => outgoing,
            None => continue,
        };

        for (i, first) in incoming.iter().enumerate() {
            if i > 0 && incoming[i - 1].timestamp == first.timestamp {
                continue;
            }
            let t0 = first.timestamp;
            let window_end = t0.saturating_add(window);
            let inflows: Vec<&Flow> = incoming[i..]
                .iter()
                .take_while(|flow| flow.timestamp <= window_end)
                .collect();

            let senders: BTreeSet<&str> = inflows.iter().map(|flow| flow.counterparty).collect();
            if senders.len() < params.min_distinct_senders {
                continue;
            }

            let last_inflow = inflows.last().map(|flow| flow.timestamp).unwrap_or(t0);
            let horizon = t0.saturating_add(window.saturating_mul(2));
            let outflows: Vec<&Flow> = outgoing
                .iter()
                .filter(|flow| flow.timestamp > last_inflow && flow.timestamp <= horizon)
                .collect();
            if outflows.is_empty() || outflows.len() > params.max_outgoing {
                continue;
            }

            let incoming_total = total(&inflows)?;
            let outgoing_total = total(&outflows)?;
            // A required outflow beyond the decimal range can never be met
            let required = params.min_outflow_ratio.checked_mul(incoming_total);
            if required.is_some_and(|required| outgoing_total >= required) {
                candidates.push(MixerCandidate {
                    address: address.to_string(),
                    asset,
                    window_start: t0,
                    window_end,
                    distinct_senders: senders.len(),
                    incoming_count: inflows.len(),
                    incoming_total,
                    outgoing_count: outflows.len(),
                    outgoing_total,
                });
                break;
            }
        }
    }

    Ok(candidates)
}

/// Appearances of listed addresses as sender or receiver
fn known_mixer_hits(table: &RecordTable, known_mixers: &[String]) -> Vec<KnownMixerHit> {
    let mut hits: BTreeMap<String, (u64, u64)> = known_mixers
        .iter()
        .map(|address| (normalize_address(address), (0, 0)))
        .collect();

    let mut count = |address: &str, sender: bool| {
        if let Some(entry) = hits.get_mut(address) {
            if sender {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
    };

    for row in table.transactions() {
        count(&row.tx_from, true);
        if let Some(to) = &row.tx_to {
            count(to, false);
        }
    }
    for transfer in table.transfer_rows().filter_map(|row| row.transfer.as_ref()) {
        count(&transfer.from, true);
        count(&transfer.to, false);
    }

    hits.into_iter()
        .filter(|(_, (as_sender, as_receiver))| as_sender + as_receiver > 0)
        .map(|(address, (as_sender, as_receiver))| KnownMixerHit {
            address,
            as_sender,
            as_receiver,
        })
        .collect()
}
