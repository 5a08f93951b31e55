use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use super::collation::Collation;
use super::types::{CmpOp, Filter, MAX_IN_SET, MAX_PATH_DEPTH, MAX_SORT_FIELDS, Order, SortSpec};

/// Evaluates `filter` with plain binary string comparison.
pub fn eval_filter(doc: &BsonDocument, filter: &Filter) -> bool {
    eval_filter_with(doc, filter, None)
}

pub fn eval_filter_with(doc: &BsonDocument, filter: &Filter, collation: Option<&Collation>) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter_with(doc, f, collation)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter_with(doc, f, collation)),
        Filter::Not(f) => !eval_filter_with(doc, f, collation),
        Filter::Exists { path, exists } => !resolve_path(doc, path).is_empty() == *exists,
        Filter::In { path, values } => {
            let found = resolve_path(doc, path);
            found.iter().any(|v| in_set(v, values, collation))
        }
        Filter::Nin { path, values } => {
            let found = resolve_path(doc, path);
            !found.iter().any(|v| in_set(v, values, collation))
        }
        Filter::Cmp { path, op: CmpOp::Ne, value } => {
            let found = resolve_path(doc, path);
            !found.iter().any(|v| bson_equal(v, value, collation))
        }
        Filter::Cmp { path, op, value } => {
            let found = resolve_path(doc, path);
            found.iter().any(|v| match op {
                CmpOp::Eq => bson_equal(v, value, collation),
                CmpOp::Gt => comparable(v, value) && compare_bson(v, value, collation) == Ordering::Greater,
                CmpOp::Gte => comparable(v, value) && compare_bson(v, value, collation) != Ordering::Less,
                CmpOp::Lt => comparable(v, value) && compare_bson(v, value, collation) == Ordering::Less,
                CmpOp::Lte => comparable(v, value) && compare_bson(v, value, collation) != Ordering::Greater,
                CmpOp::Ne => unreachable!("handled above"),
            })
        }
        Filter::Regex { path, regex } => resolve_path(doc, path)
            .iter()
            .any(|v| matches!(v, Bson::String(s) if regex.is_match(s))),
    }
}

pub fn compare_docs(a: &BsonDocument, b: &BsonDocument, sort: &[SortSpec], collation: Option<&Collation>) -> Ordering {
    for s in sort.iter().take(MAX_SORT_FIELDS) {
        let va = get_path(a, &s.field);
        let vb = get_path(b, &s.field);
        let ord = match (va, vb) {
            (Some(x), Some(y)) => compare_bson(x, y, collation),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

fn in_set(v: &Bson, set: &[Bson], collation: Option<&Collation>) -> bool {
    set.iter().take(MAX_IN_SET).any(|x| bson_equal(v, x, collation))
}

fn bson_equal(a: &Bson, b: &Bson, collation: Option<&Collation>) -> bool {
    match (a, b, collation) {
        (Bson::String(x), Bson::String(y), Some(c)) => c.equals(x, y),
        _ if is_num(a) && is_num(b) => as_f64_num(a) == as_f64_num(b),
        _ => a == b,
    }
}

/// Range operators only compare values of the same broad type.
fn comparable(a: &Bson, b: &Bson) -> bool {
    (is_num(a) && is_num(b)) || std::mem::discriminant(a) == std::mem::discriminant(b)
}

/// Resolves a dotted path to a single value without descending into arrays.
pub fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut cur = doc;
    let mut parts = path.split('.').take(MAX_PATH_DEPTH).peekable();
    while let Some(part) = parts.next() {
        let v = cur.get(part)?;
        if parts.peek().is_none() {
            return Some(v);
        }
        match v {
            Bson::Document(d) => cur = d,
            _ => return None,
        }
    }
    None
}

/// Resolves a dotted path, fanning out across arrays of sub-documents.
///
/// A terminal array contributes both itself and each of its elements, so an
/// equality test on `basic.roles.name` matches when any role carries the name.
pub fn resolve_path<'a>(doc: &'a BsonDocument, path: &str) -> Vec<&'a Bson> {
    let mut out = Vec::new();
    if path.is_empty() || path.len() > 1024 {
        return out;
    }
    let parts: Vec<&str> = path.split('.').take(MAX_PATH_DEPTH).collect();
    collect_path(doc, &parts, &mut out);
    out
}

fn collect_path<'a>(doc: &'a BsonDocument, parts: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = parts.split_first() else { return };
    let Some(v) = doc.get(*head) else { return };
    if rest.is_empty() {
        if let Bson::Array(items) = v {
            out.extend(items.iter());
        }
        out.push(v);
        return;
    }
    match v {
        Bson::Document(d) => collect_path(d, rest, out),
        Bson::Array(items) => {
            for item in items {
                if let Bson::Document(d) = item {
                    collect_path(d, rest, out);
                }
            }
        }
        _ => {}
    }
}

fn is_num(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

#[allow(clippy::cast_precision_loss)]
fn as_f64_num(x: &Bson) -> f64 {
    match x {
        Bson::Int32(i) => f64::from(*i),
        Bson::Int64(i) => *i as f64,
        Bson::Double(f) => *f,
        _ => f64::NAN,
    }
}

pub fn compare_bson(a: &Bson, b: &Bson, collation: Option<&Collation>) -> Ordering {
    if is_num(a) && is_num(b) {
        if let (Bson::Int64(x), Bson::Int64(y)) = (a, b) {
            return x.cmp(y);
        }
        return as_f64_num(a).total_cmp(&as_f64_num(b));
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => match collation {
            Some(c) => c.compare(x, y),
            None => x.cmp(y),
        },
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::Null | Bson::Undefined => 0,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 1,
        Bson::String(_) | Bson::Symbol(_) => 2,
        Bson::Document(_) => 3,
        Bson::Array(_) => 4,
        Bson::Binary(_) => 5,
        Bson::ObjectId(_) => 6,
        Bson::Boolean(_) => 7,
        Bson::DateTime(_) => 8,
        Bson::Timestamp(_) => 9,
        Bson::RegularExpression(_) => 10,
        _ => 11,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn roles_doc() -> BsonDocument {
        doc! {
            "basic": {"email": "a@x.com", "roles": [{"name": "agent"}, {"name": "Admin"}]},
            "count": 3_i64,
        }
    }

    #[test]
    fn array_fan_out_matches_any_element() {
        let d = roles_doc();
        assert!(eval_filter(&d, &Filter::eq("basic.roles.name", "agent")));
        assert!(!eval_filter(&d, &Filter::eq("basic.roles.name", "broker")));
        assert!(!eval_filter(&d, &Filter::eq("basic.roles.name", "admin")));
        let c = Collation::default();
        assert!(eval_filter_with(&d, &Filter::eq("basic.roles.name", "admin"), Some(&c)));
    }

    #[test]
    fn ne_matches_missing_fields() {
        let d = roles_doc();
        assert!(eval_filter(&d, &Filter::ne("_id", "someone")));
        assert!(!eval_filter(&d, &Filter::ne("basic.email", "a@x.com")));
    }

    #[test]
    fn numeric_comparisons_cross_widths() {
        let d = roles_doc();
        assert!(eval_filter(&d, &Filter::cmp("count", CmpOp::Lte, 3_i32)));
        assert!(eval_filter(&d, &Filter::cmp("count", CmpOp::Gt, 2.5_f64)));
        assert!(!eval_filter(&d, &Filter::cmp("count", CmpOp::Gt, "2")));
    }

    #[test]
    fn regex_matches_strings_only() {
        let d = roles_doc();
        let f = Filter::regex("basic.email", &regex::escape("A@X"), true).unwrap();
        assert!(eval_filter(&d, &f));
        let f = Filter::regex("count", "3", true).unwrap();
        assert!(!eval_filter(&d, &f));
    }

    #[test]
    fn sort_honours_collation() {
        let a = doc! {"n": "item10"};
        let b = doc! {"n": "Item2"};
        let sort = [SortSpec::asc("n")];
        assert_eq!(compare_docs(&a, &b, &sort, None), Ordering::Greater);
        assert_eq!(compare_docs(&a, &b, &sort, Some(&Collation::default())), Ordering::Greater);
        let sort = [SortSpec::desc("n")];
        assert_eq!(compare_docs(&a, &b, &sort, Some(&Collation::default())), Ordering::Less);
    }
}
