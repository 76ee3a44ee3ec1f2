//! Query-string encoding of row requests.
//!
//! Values are returned unescaped; reqwest percent-encodes them when the
//! pairs are attached to the request URL.

use crate::domain::ports::{Filter, Order, SelectRequest, Selection};

pub(super) type QueryPairs = Vec<(String, String)>;

/// Pairs for a read: `select`, one pair per filter and an optional `order`.
pub(super) fn select_pairs(request: &SelectRequest) -> QueryPairs {
    let mut pairs = vec![selection_pair(&request.selection)];
    pairs.extend(filter_pairs(&request.filters));
    if let Some(order) = &request.order {
        pairs.push(order_pair(order));
    }
    pairs
}

/// `select=<columns>` for reads and for returned representations.
pub(super) fn selection_pair(selection: &Selection) -> (String, String) {
    ("select".to_owned(), selection.to_select_param())
}

/// `<column>=<op>.<value>` for each predicate.
pub(super) fn filter_pairs(filters: &[Filter]) -> QueryPairs {
    filters
        .iter()
        .map(|filter| {
            (
                filter.column.clone(),
                format!("{}.{}", filter.op.as_str(), filter.value),
            )
        })
        .collect()
}

fn order_pair(order: &Order) -> (String, String) {
    let direction = if order.ascending { "asc" } else { "desc" };
    ("order".to_owned(), format!("{}.{direction}", order.column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Table;
    use rstest::rstest;

    fn pair(key: &str, value: &str) -> (String, String) {
        (key.to_owned(), value.to_owned())
    }

    #[rstest]
    fn encodes_a_joined_filtered_read() {
        let request = SelectRequest::new(Table::Rides)
            .select(Selection::all().join(Table::Profiles, ["phone_number"]))
            .filter(Filter::ilike_contains("destination", "Airport"))
            .filter(Filter::gte("date", "2024-03-10T00:00:00.000Z"))
            .order(Order::ascending("date"));

        assert_eq!(
            select_pairs(&request),
            vec![
                pair("select", "*,profiles(phone_number)"),
                pair("destination", "ilike.%Airport%"),
                pair("date", "gte.2024-03-10T00:00:00.000Z"),
                pair("order", "date.asc"),
            ]
        );
    }

    #[rstest]
    #[case::ascending(true, "date.asc")]
    #[case::descending(false, "date.desc")]
    fn encodes_order_direction(#[case] ascending: bool, #[case] expected: &str) {
        let order = Order {
            column: "date".to_owned(),
            ascending,
        };
        assert_eq!(order_pair(&order), pair("order", expected));
    }

    #[rstest]
    fn plain_read_only_selects() {
        let request = SelectRequest::new(Table::Profiles);
        assert_eq!(select_pairs(&request), vec![pair("select", "*")]);
    }
}
