use rust_decimal::Decimal;
use serde::Serialize;

use crate::blockchain::ZERO_ADDRESS;
use crate::table::RecordTable;

/// Table-wide counts and totals. A total is `None` when the sum leaves the
/// decimal range.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Summary {
    pub blocks: usize,
    pub transactions: usize,
    pub rows: usize,
    pub transfer_rows: usize,
    pub contract_creations: usize,
    pub total_value_eth: Option<Decimal>,
    pub total_gas_fee_eth: Option<Decimal>,
}

/// Transfers to the zero address from a non-zero sender
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BurnTransfers {
    pub count: u64,
    /// `None` when the burned amount leaves the decimal range
    pub total_amount: Option<Decimal>,
}

fn add(total: Option<Decimal>, amount: Decimal) -> Option<Decimal> {
    total.and_then(|total| total.checked_add(amount))
}

pub fn summary(table: &RecordTable) -> Summary {
    let mut summary = Summary {
        blocks: table.blocks().len(),
        transactions: 0,
        rows: table.len(),
        transfer_rows: table.transfer_rows().count(),
        contract_creations: 0,
        total_value_eth: Some(Decimal::ZERO),
        total_gas_fee_eth: Some(Decimal::ZERO),
    };
    for row in table.transactions() {
        summary.transactions += 1;
        if row.tx_to.is_none() {
            summary.contract_creations += 1;
        }
        summary.total_value_eth = add(summary.total_value_eth, row.value_eth);
        summary.total_gas_fee_eth = add(summary.total_gas_fee_eth, row.gas_fee_eth);
    }
    summary
}

pub fn burn_transfers(table: &RecordTable) -> BurnTransfers {
    let mut burns = BurnTransfers {
        count: 0,
        total_amount: Some(Decimal::ZERO),
    };
    for transfer in table.transfer_rows().filter_map(|row| row.transfer.as_ref()) {
        if transfer.to == ZERO_ADDRESS && transfer.from != ZERO_ADDRESS {
            burns.count += 1;
            burns.total_amount = add(burns.total_amount, transfer.amount.unwrap_or_default());
        }
    }
    burns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::{addr, huge_amount, transfer, tx, with_fee, with_value};

    #[test]
    fn test_summary_counts_transactions_once() {
        let fan_out = with_fee(transfer(1, 20, &addr(1), &addr(2), Some(Decimal::ONE)), 2_000_000_000_000_000);
        let mut second = fan_out.clone();
        if let Some(t) = second.transfer.as_mut() {
            t.log_index = 1;
        }
        let table = RecordTable::new(
            vec![
                with_value(tx(0, 10, &addr(1), None), 1_500_000_000_000_000_000),
                fan_out,
                second,
            ],
            vec![],
        );

        let summary = summary(&table);
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.transactions, 2);
        assert_eq!(summary.transfer_rows, 2);
        assert_eq!(summary.contract_creations, 1);
        assert_eq!(summary.total_value_eth, Some(Decimal::new(15, 1)));
        assert_eq!(summary.total_gas_fee_eth, Some(Decimal::new(2_000_000_000_021, 15)));
    }

    #[test]
    fn test_burn_excludes_zero_address_sender() {
        let table = RecordTable::new(
            vec![
                transfer(0, 10, &addr(1), ZERO_ADDRESS, Some(Decimal::from(3))),
                // mint
                transfer(1, 20, ZERO_ADDRESS, &addr(1), Some(Decimal::from(7))),
                transfer(2, 30, ZERO_ADDRESS, ZERO_ADDRESS, Some(Decimal::from(11))),
                transfer(3, 40, &addr(2), ZERO_ADDRESS, None),
            ],
            vec![],
        );

        let burns = burn_transfers(&table);
        assert_eq!(burns.count, 2);
        assert_eq!(burns.total_amount, Some(Decimal::from(3)));
    }

    #[test]
    fn test_burn_total_beyond_decimal_range_is_none() {
        let table = RecordTable::new(
            vec![
                transfer(0, 10, &addr(1), ZERO_ADDRESS, huge_amount()),
                transfer(1, 20, &addr(2), ZERO_ADDRESS, huge_amount()),
            ],
            vec![],
        );

        let burns = burn_transfers(&table);
        assert_eq!(burns.count, 2);
        assert_eq!(burns.total_amount, None);
    }
}
