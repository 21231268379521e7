//! Result of a multi-MBean query.

use std::slice;

use crate::worker::AttributeRecord;

/// One entry of a [`QueryOutcome`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryItem {
    /// An attribute returned by the worker. The value itself may still be an
    /// [`AttributeValue::Error`](crate::worker::AttributeValue::Error).
    Success(AttributeRecord),
    /// An MBean or attribute the worker refused to read.
    Error(String),
}

impl QueryItem {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// `"success"` or the failure description.
    pub fn status_message(&self) -> &str {
        match self {
            Self::Success(_) => "success",
            Self::Error(message) => message,
        }
    }

    pub fn attribute(&self) -> Option<&AttributeRecord> {
        match self {
            Self::Success(record) => Some(record),
            Self::Error(_) => None,
        }
    }
}

/// Ordered results of a query: MBeans in enumeration order, attributes in
/// enumeration order within each MBean.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    items: Vec<QueryItem>,
}

impl QueryOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_success(&mut self, record: AttributeRecord) {
        self.items.push(QueryItem::Success(record));
    }

    pub(crate) fn push_error(&mut self, message: String) {
        self.items.push(QueryItem::Error(message));
    }

    /// Attributes of every successful entry, in order.
    pub fn valid_attributes(&self) -> Vec<&AttributeRecord> {
        self.items.iter().filter_map(QueryItem::attribute).collect()
    }

    /// Failure messages, in order.
    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            QueryItem::Error(message) => Some(message.as_str()),
            QueryItem::Success(_) => None,
        })
    }

    pub fn iter(&self) -> slice::Iter<'_, QueryItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<QueryItem> {
        self.items
    }
}

impl IntoIterator for QueryOutcome {
    type Item = QueryItem;
    type IntoIter = std::vec::IntoIter<QueryItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryOutcome {
    type Item = &'a QueryItem;
    type IntoIter = slice::Iter<'a, QueryItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
