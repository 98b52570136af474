//! Demo transaction generator.
//!
//! Produces legitimate and known-threat transactions from fixed templates.
//! Seeded generators are fully reproducible given the same anchor time.

use crate::types::transaction::Transaction;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BANKS: [&str; 3] = ["Bank A", "Bank B", "Bank C"];
const ACCOUNTS: [&str; 4] = ["Alice", "Bob", "Charlie", "admin"];

/// (description, amount, channel)
const LEGITIMATE: [(&str, f64, &str); 15] = [
    ("Coffee at Starbucks", 4.50, "card"),
    ("Grocery shopping at Walmart", 87.32, "card"),
    ("Gas station fill-up", 45.00, "card"),
    ("Online shopping Amazon", 156.78, "online"),
    ("Restaurant dinner", 67.90, "card"),
    ("Movie tickets", 28.00, "online"),
    ("Gym membership", 49.99, "direct_debit"),
    ("Phone bill payment", 85.00, "direct_debit"),
    ("Electric utility", 120.50, "direct_debit"),
    ("Rent payment", 1500.00, "transfer"),
    ("Car insurance", 275.00, "direct_debit"),
    ("Netflix subscription", 15.99, "online"),
    ("Spotify premium", 9.99, "online"),
    ("Pharmacy prescription", 34.50, "card"),
    ("Pet store supplies", 56.80, "card"),
];

const THREATS: [(&str, f64, &str); 8] = [
    ("Unauthorized card testing", 1.00, "online"),
    ("Suspicious offshore transfer", 9500.00, "wire"),
    ("Stolen card purchase", 2500.00, "card"),
    ("Card verification attempt", 0.50, "online"),
    ("Unusual foreign transaction", 7800.00, "card"),
    ("Multiple small charges", 2.99, "online"),
    ("High-risk merchant", 5600.00, "card"),
    ("Suspicious ATM withdrawal", 3000.00, "atm"),
];

/// Share of a demo dataset that is known threats
const THREAT_SHARE: f64 = 0.15;

/// Generates demo transactions timestamped within the 24h before `anchor`
pub struct DemoGenerator {
    rng: StdRng,
    anchor: DateTime<Utc>,
    counter: u64,
}

impl DemoGenerator {
    /// Reproducible generator
    pub fn seeded(seed: u64, anchor: DateTime<Utc>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            anchor,
            counter: 0,
        }
    }

    /// Generator seeded from OS entropy
    pub fn from_entropy(anchor: DateTime<Utc>) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            anchor,
            counter: 0,
        }
    }

    /// A legitimate transaction from a random account
    pub fn legitimate(&mut self) -> Transaction {
        let (description, amount, channel) = self.pick(&LEGITIMATE);
        let bank = self.pick(&BANKS);
        let account = self.pick(&ACCOUNTS);
        self.build(description, amount, channel)
            .with_bank(bank)
            .with_account(account)
    }

    /// A transaction matching a fraud template. `labelled` marks it as a
    /// confirmed threat; unlabelled ones are left for the scorer to catch.
    pub fn threat(&mut self, labelled: bool) -> Transaction {
        let (description, amount, channel) = self.pick(&THREATS);
        let bank = self.pick(&BANKS);
        let mut tx = self
            .build(description, amount, channel)
            .with_bank(bank)
            .with_account("system");
        tx.is_fraud = labelled;
        tx
    }

    /// Labelled dataset: 85% legitimate history, 15% known threats, ids
    /// `demo_{n}` and `demo_threat_{n}`, shuffled
    pub fn dataset(&mut self, count: usize) -> Vec<Transaction> {
        let threats = (count as f64 * THREAT_SHARE).round() as usize;
        let legitimate = count - threats;

        let mut data = Vec::with_capacity(count);
        for i in 0..legitimate {
            let mut tx = self.legitimate();
            tx.transaction_id = format!("demo_{i}");
            data.push(tx);
        }
        for i in 0..threats {
            let mut tx = self.threat(true);
            tx.transaction_id = format!("demo_threat_{i}");
            data.push(tx);
        }

        // Fisher-Yates with our own rng keeps the order reproducible
        for i in (1..data.len()).rev() {
            let j = self.rng.gen_range(0..=i);
            data.swap(i, j);
        }
        data
    }

    fn build(&mut self, description: &str, amount: f64, channel: &str) -> Transaction {
        self.counter += 1;
        let age = Duration::seconds(self.rng.gen_range(0..86_400));
        Transaction::new(format!("tx_{:012}", self.counter), amount, description)
            .with_channel(channel)
            .with_timestamp(self.anchor - age)
    }

    fn pick<T: Copy>(&mut self, choices: &[T]) -> T {
        choices[self.rng.gen_range(0..choices.len())]
    }
}
