use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::protocol::PageQuery;

use crate::config::ClientSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn toggled(self) -> Self {
        match self {
            Order::Asc => Order::Desc,
            Order::Desc => Order::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SortValue {
    fn rank(&self) -> u8 {
        match self {
            SortValue::Bool(_) => 0,
            SortValue::Number(_) => 1,
            SortValue::Text(_) => 2,
        }
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Bool(a), SortValue::Bool(b)) => a.cmp(b),
            (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<&str> for SortValue {
    fn from(value: &str) -> Self {
        SortValue::Text(value.to_string())
    }
}

impl From<String> for SortValue {
    fn from(value: String) -> Self {
        SortValue::Text(value)
    }
}

impl From<f64> for SortValue {
    fn from(value: f64) -> Self {
        SortValue::Number(value)
    }
}

impl From<i64> for SortValue {
    fn from(value: i64) -> Self {
        SortValue::Number(value as f64)
    }
}

impl From<bool> for SortValue {
    fn from(value: bool) -> Self {
        SortValue::Bool(value)
    }
}

pub trait TableRow {
    type Id: Clone + PartialEq;

    fn row_id(&self) -> Self::Id;

    fn sort_value(&self, key: &str) -> Option<SortValue>;
}

impl TableRow for Value {
    type Id = String;

    fn row_id(&self) -> String {
        match self.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn sort_value(&self, key: &str) -> Option<SortValue> {
        match self.get(key)? {
            Value::Null => None,
            Value::Bool(flag) => Some(SortValue::Bool(*flag)),
            Value::Number(number) => number.as_f64().map(SortValue::Number),
            Value::String(text) => Some(SortValue::Text(text.clone())),
            other => Some(SortValue::Text(other.to_string())),
        }
    }
}

/// Missing values go last.
pub fn descending_comparator<R: TableRow>(a: &R, b: &R, order_by: &str) -> Ordering {
    match (a.sort_value(order_by), b.sort_value(order_by)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => b.compare(&a),
    }
}

pub fn get_comparator<R: TableRow>(order: Order, order_by: &str) -> impl Fn(&R, &R) -> Ordering {
    let order_by = order_by.to_string();
    move |a, b| match order {
        Order::Desc => descending_comparator(a, b, &order_by),
        Order::Asc => descending_comparator(a, b, &order_by).reverse(),
    }
}

/// Ties keep their original relative order.
pub fn stable_sort<R, F>(rows: Vec<R>, comparator: F) -> Vec<R>
where
    F: Fn(&R, &R) -> Ordering,
{
    let mut tagged: Vec<(usize, R)> = rows.into_iter().enumerate().collect();
    tagged.sort_unstable_by(|(left_index, left), (right_index, right)| {
        comparator(left, right).then_with(|| left_index.cmp(right_index))
    });
    tagged.into_iter().map(|(_, row)| row).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    Client,
    Server,
}

pub fn apply_sort<R: TableRow>(rows: Vec<R>, mode: SortMode, order: Order, order_by: &str) -> Vec<R> {
    match mode {
        SortMode::Server => rows,
        SortMode::Client if order_by.is_empty() => rows,
        SortMode::Client => stable_sort(rows, get_comparator(order, order_by)),
    }
}

pub fn empty_rows(page: usize, rows_per_page: usize, len: usize) -> usize {
    if page == 0 {
        return 0;
    }
    (page + 1)
        .saturating_mul(rows_per_page)
        .saturating_sub(len)
}

pub fn rows_in_page<R>(rows: &[R], page: usize, rows_per_page: usize) -> &[R] {
    let start = page.saturating_mul(rows_per_page).min(rows.len());
    let end = start.saturating_add(rows_per_page).min(rows.len());
    &rows[start..end]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefaults {
    pub order_by: String,
    pub order: Order,
    pub rows_per_page: usize,
    pub page: usize,
    pub dense: bool,
    pub sort_mode: SortMode,
}

impl Default for TableDefaults {
    fn default() -> Self {
        Self {
            order_by: "name".to_string(),
            order: Order::Asc,
            rows_per_page: 5,
            page: 0,
            dense: false,
            sort_mode: SortMode::Client,
        }
    }
}

impl TableDefaults {
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            rows_per_page: (settings.default_rows_per_page as usize).max(1),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableState<Id = String> {
    page: usize,
    rows_per_page: usize,
    order: Order,
    order_by: String,
    selected: Vec<Id>,
    dense: bool,
    sort_mode: SortMode,
}

impl<Id> Default for TableState<Id> {
    fn default() -> Self {
        Self::new(TableDefaults::default())
    }
}

impl<Id> TableState<Id> {
    pub fn new(defaults: TableDefaults) -> Self {
        Self {
            page: defaults.page,
            rows_per_page: defaults.rows_per_page.max(1),
            order: defaults.order,
            order_by: defaults.order_by,
            selected: Vec::new(),
            dense: defaults.dense,
            sort_mode: defaults.sort_mode,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn rows_per_page(&self) -> usize {
        self.rows_per_page
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn order_by(&self) -> &str {
        &self.order_by
    }

    pub fn selected(&self) -> &[Id] {
        &self.selected
    }

    pub fn dense(&self) -> bool {
        self.dense
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page;
    }

    pub fn set_rows_per_page(&mut self, rows_per_page: usize) {
        self.rows_per_page = rows_per_page.max(1);
    }

    pub fn set_order(&mut self, order: Order) {
        self.order = order;
    }

    pub fn set_order_by(&mut self, order_by: impl Into<String>) {
        self.order_by = order_by.into();
    }

    pub fn set_selected(&mut self, selected: Vec<Id>) {
        self.selected = selected;
    }

    pub fn set_dense(&mut self, dense: bool) {
        self.dense = dense;
    }

    pub fn set_sort_mode(&mut self, sort_mode: SortMode) {
        self.sort_mode = sort_mode;
    }

    pub fn on_sort(&mut self, field: &str) {
        if field.is_empty() {
            return;
        }
        if self.order_by == field {
            self.order = self.order.toggled();
        } else {
            self.order_by = field.to_string();
            self.order = Order::Asc;
        }
    }

    pub fn on_change_page(&mut self, page: usize) {
        self.page = page;
    }

    pub fn on_change_rows_per_page(&mut self, rows_per_page: usize) {
        self.page = 0;
        self.rows_per_page = rows_per_page.max(1);
    }

    pub fn on_change_dense(&mut self, dense: bool) {
        self.dense = dense;
    }

    pub fn on_reset_page(&mut self) {
        self.page = 0;
    }

    pub fn on_update_page_delete_row(&mut self, total_rows_in_page: usize) {
        self.selected.clear();
        if self.page > 0 && total_rows_in_page < 2 {
            self.page -= 1;
        }
    }

    pub fn on_update_page_delete_rows(
        &mut self,
        total_rows_in_page: usize,
        total_rows_filtered: usize,
    ) {
        let total_selected = self.selected.len();
        self.selected.clear();
        if self.page == 0 {
            return;
        }
        if total_selected == total_rows_in_page {
            self.page -= 1;
        } else if total_selected == total_rows_filtered {
            self.page = 0;
        } else if total_selected > total_rows_in_page {
            let remaining = total_rows_filtered.saturating_sub(total_selected);
            self.page = remaining.div_ceil(self.rows_per_page).saturating_sub(1);
        }
    }

    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: u32::try_from(self.page.saturating_add(1)).unwrap_or(u32::MAX),
            limit: u32::try_from(self.rows_per_page).unwrap_or(u32::MAX),
        }
    }

    pub fn empty_rows(&self, len: usize) -> usize {
        empty_rows(self.page, self.rows_per_page, len)
    }

    pub fn rows_in_page<'a, R>(&self, rows: &'a [R]) -> &'a [R] {
        rows_in_page(rows, self.page, self.rows_per_page)
    }

    pub fn sort_rows<R: TableRow>(&self, rows: Vec<R>) -> Vec<R> {
        apply_sort(rows, self.sort_mode, self.order, &self.order_by)
    }
}

impl<Id: Clone + PartialEq> TableState<Id> {
    pub fn on_select_row(&mut self, id: Id) {
        if let Some(position) = self.selected.iter().position(|selected| *selected == id) {
            self.selected.remove(position);
        } else {
            self.selected.push(id);
        }
    }

    pub fn on_select_all_rows<I>(&mut self, checked: bool, ids: I)
    where
        I: IntoIterator<Item = Id>,
    {
        self.selected.clear();
        if !checked {
            return;
        }
        for id in ids {
            if !self.selected.contains(&id) {
                self.selected.push(id);
            }
        }
    }

    pub fn is_selected(&self, id: &Id) -> bool {
        self.selected.contains(id)
    }
}

#[cfg(test)]
#[path = "tests/table_tests.rs"]
mod tests;
