//! String comparison rules shared by sort and match stages.
//!
//! The listing page query and its count query must agree on which strings are
//! equal and how they order, so both run with the same `Collation`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collation {
    pub locale: String,
    /// Compare letters without regard to case (secondary strength).
    pub case_insensitive: bool,
    /// Compare runs of ASCII digits by numeric value, so "item2" < "item10".
    pub numeric_ordering: bool,
}

impl Default for Collation {
    fn default() -> Self {
        Self { locale: "en".to_string(), case_insensitive: true, numeric_ordering: true }
    }
}

impl Collation {
    /// Plain binary comparison, what a query without a collation gets.
    #[must_use]
    pub fn simple() -> Self {
        Self { locale: "simple".to_string(), case_insensitive: false, numeric_ordering: false }
    }

    #[must_use]
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        if !self.case_insensitive && !self.numeric_ordering {
            return a.cmp(b);
        }
        let mut xs = Segments::new(a, self.numeric_ordering);
        let mut ys = Segments::new(b, self.numeric_ordering);
        loop {
            match (xs.next(), ys.next()) {
                (None, None) => break,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(x), Some(y)) => {
                    let ord = self.compare_segment(x, y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
            }
        }
        Ordering::Equal
    }

    #[must_use]
    pub fn equals(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }

    fn compare_segment(&self, x: Segment<'_>, y: Segment<'_>) -> Ordering {
        match (x, y) {
            (Segment::Digits(a), Segment::Digits(b)) => compare_digit_runs(a, b),
            // Digits sort before letters, as in the default ICU root ordering.
            (Segment::Digits(_), Segment::Text(_)) => Ordering::Less,
            (Segment::Text(_), Segment::Digits(_)) => Ordering::Greater,
            (Segment::Text(a), Segment::Text(b)) => {
                if self.case_insensitive {
                    let la = a.chars().flat_map(char::to_lowercase);
                    let lb = b.chars().flat_map(char::to_lowercase);
                    la.cmp(lb)
                } else {
                    a.cmp(b)
                }
            }
        }
    }
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let ta = a.trim_start_matches('0');
    let tb = b.trim_start_matches('0');
    ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb))
}

#[derive(Debug, Clone, Copy)]
enum Segment<'a> {
    Digits(&'a str),
    Text(&'a str),
}

struct Segments<'a> {
    rest: &'a str,
    split_digits: bool,
}

impl<'a> Segments<'a> {
    fn new(s: &'a str, split_digits: bool) -> Self {
        Self { rest: s, split_digits }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        if !self.split_digits {
            let all = self.rest;
            self.rest = "";
            return Some(Segment::Text(all));
        }
        let first_is_digit = self.rest.as_bytes()[0].is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != first_is_digit)
            .map_or(self.rest.len(), |(i, _)| i);
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        Some(if first_is_digit { Segment::Digits(head) } else { Segment::Text(head) })
    }
}
