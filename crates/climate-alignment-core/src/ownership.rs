use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::{
    ExposureRow, LoanIndicator, LoanRecord, OwnershipRecord, PortfolioDate, ProductionRow,
};

/// company_id -> resolved parent_company_id.
pub type ParentMap = HashMap<String, String>;

/// Portfolio label of the synthetic equal-weight loan book.
pub const SYNTHETIC_PORTFOLIO: &str = "all";

/// Resolve every company in the ownership table to exactly one parent.
///
/// Companies with qualifying parent records resolve to the closest one
/// (lowest ownership level wins ties). With `stop_at_weak_parents` any
/// `is_parent` record qualifies; without it only ultimate (listed) parents
/// do. Companies with no qualifying record fall back to their most distant
/// ownership record of any kind, a business-policy approximation that
/// guarantees resolution but can route exposure to a loosely related
/// entity.
pub fn parent_map(ownership: &[OwnershipRecord], stop_at_weak_parents: bool) -> ParentMap {
    let mut qualifying: Vec<&OwnershipRecord> = ownership
        .iter()
        .filter(|record| {
            if stop_at_weak_parents {
                record.is_parent
            } else {
                record.is_parent && (record.is_ultimate_listed_parent || record.is_ultimate_parent)
            }
        })
        .collect();
    qualifying.sort_by_key(|record| record.ownership_level);

    let mut map = ParentMap::new();
    for record in qualifying {
        map.entry(record.company_id.clone())
            .or_insert_with(|| record.parent_company_id.clone());
    }

    let mut fallback: Vec<&OwnershipRecord> = ownership
        .iter()
        .filter(|record| !map.contains_key(&record.company_id))
        .collect();
    fallback.sort_by_key(|record| std::cmp::Reverse(record.ownership_level));
    for record in fallback {
        map.entry(record.company_id.clone())
            .or_insert_with(|| record.parent_company_id.clone());
    }

    map
}

// ---------------------------------------------------------------------------
// Working loans
// ---------------------------------------------------------------------------

/// A loan with its indicator amount selected, as the pipeline carries it.
#[derive(Debug, Clone)]
pub struct WorkingLoan {
    pub loan_id: String,
    pub company_id: String,
    pub portfolio_id: String,
    pub portfolio_date: PortfolioDate,
    pub sector: Option<String>,
    pub amount: Decimal,
    pub total_assets: Option<Decimal>,
    pub turnover: Option<Decimal>,
}

/// Select the indicator column and drop the rest of the loan record.
pub fn working_loans(loans: &[LoanRecord], indicator: LoanIndicator) -> Vec<WorkingLoan> {
    loans
        .iter()
        .map(|loan| WorkingLoan {
            loan_id: loan.loan_id.clone(),
            company_id: loan.company_id.clone(),
            portfolio_id: loan.portfolio_id.clone(),
            portfolio_date: loan.portfolio_date,
            sector: loan.sector.clone(),
            amount: indicator.amount(loan),
            total_assets: loan.total_assets,
            turnover: loan.turnover,
        })
        .collect()
}

/// Fabricate an equal-weight loan book over the climate universe of one
/// vintage: indicator 1 per distinct company, one shared portfolio, the
/// vintage's December as portfolio date.
pub fn synthetic_loans(production: &[ProductionRow], year: i32) -> Vec<WorkingLoan> {
    let companies: BTreeSet<&str> = production.iter().map(|row| row.company_id.as_str()).collect();
    companies
        .into_iter()
        .map(|company_id| WorkingLoan {
            loan_id: company_id.to_string(),
            company_id: company_id.to_string(),
            portfolio_id: SYNTHETIC_PORTFOLIO.to_string(),
            portfolio_date: PortfolioDate::from_year_month(year, 12),
            sector: None,
            amount: Decimal::ONE,
            total_assets: None,
            turnover: None,
        })
        .collect()
}

/// Reassign loans to their resolved parents and re-aggregate rows that now
/// share a (company, loan, portfolio, date, sector) identity. Loans to
/// companies the ownership table does not know are dropped.
pub fn consolidate_to_parents(loans: Vec<WorkingLoan>, parents: &ParentMap) -> Vec<WorkingLoan> {
    type Key = (String, String, String, PortfolioDate, Option<String>);
    let mut groups: BTreeMap<Key, WorkingLoan> = BTreeMap::new();
    for mut loan in loans {
        let Some(parent_id) = parents.get(&loan.company_id) else {
            continue;
        };
        loan.company_id = parent_id.clone();
        let key = (
            loan.company_id.clone(),
            loan.loan_id.clone(),
            loan.portfolio_id.clone(),
            loan.portfolio_date,
            loan.sector.clone(),
        );
        match groups.entry(key) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(loan);
            }
            std::collections::btree_map::Entry::Occupied(mut entry) => {
                entry.get_mut().amount += loan.amount;
            }
        }
    }
    groups.into_values().collect()
}

/// Collapse individual loans to one row per (portfolio, date, company,
/// sector). The replacement loan id is a stable hash over the constituent
/// loan ids, so repeated runs produce the same identifier.
pub fn aggregate_loans(loans: Vec<WorkingLoan>) -> Vec<WorkingLoan> {
    type Key = (String, PortfolioDate, String, Option<String>);

    struct Group {
        first: WorkingLoan,
        constituent_ids: String,
    }

    let mut groups: BTreeMap<Key, Group> = BTreeMap::new();
    for loan in loans {
        let key = (
            loan.portfolio_id.clone(),
            loan.portfolio_date,
            loan.company_id.clone(),
            loan.sector.clone(),
        );
        match groups.entry(key) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                let constituent_ids = loan.loan_id.clone();
                entry.insert(Group {
                    first: loan,
                    constituent_ids,
                });
            }
            std::collections::btree_map::Entry::Occupied(mut entry) => {
                let group = entry.get_mut();
                group.first.amount += loan.amount;
                group.constituent_ids.push_str(&loan.loan_id);
            }
        }
    }

    groups
        .into_values()
        .map(|group| {
            let mut loan = group.first;
            loan.loan_id = format!("{:016x}", fnv1a64(group.constituent_ids.as_bytes()));
            loan
        })
        .collect()
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Attach each loan to the climate rows of its company. Loans without any
/// climate counterpart contribute nothing.
pub fn merge_loan_climate(loans: &[WorkingLoan], production: &[ProductionRow]) -> Vec<ExposureRow> {
    let mut by_company: HashMap<&str, Vec<&ProductionRow>> = HashMap::new();
    for row in production {
        by_company.entry(row.company_id.as_str()).or_default().push(row);
    }

    let mut out = Vec::new();
    for loan in loans {
        let Some(rows) = by_company.get(loan.company_id.as_str()) else {
            continue;
        };
        for row in rows {
            out.push(ExposureRow {
                loan_id: loan.loan_id.clone(),
                company_id: loan.company_id.clone(),
                company_name: row.company_name.clone(),
                portfolio_id: loan.portfolio_id.clone(),
                portfolio_date: loan.portfolio_date,
                sector: row.sector.clone(),
                technology: row.technology.clone(),
                year: row.year,
                region: row.region.clone(),
                production: row.production,
                target: row.target,
                amount: loan.amount,
                total_assets: loan.total_assets,
                turnover: loan.turnover,
                norm: Decimal::ONE,
            });
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
