//! Typed store operations
//!
//! The three calls the engine needs, with their documents and response
//! shapes decoded at the boundary.

use super::{Operation, Transport};
use crate::error::{TransportError, UserError};
use crate::types::{Page, PageCursor, Record, RecordId, TagSet};
use serde::Deserialize;
use serde_json::json;

/// Page through orders with their first transactions
pub const GET_ORDERS: Operation = Operation {
    name: "getOrders",
    document: r"query getOrders($first: Int!, $after: String) {
  orders(first: $first, after: $after) {
    pageInfo {
      hasNextPage
      endCursor
    }
    edges {
      node {
        id
        name
        tags
        transactions(first: 5) {
          gateway
          status
        }
      }
    }
  }
}",
};

/// Read the current tags of one order
pub const GET_ORDER_TAGS: Operation = Operation {
    name: "getOrder",
    document: r"query getOrder($id: ID!) {
  order(id: $id) {
    id
    tags
  }
}",
};

/// Replace the tag list of one order
pub const UPDATE_ORDER_TAGS: Operation = Operation {
    name: "orderUpdate",
    document: r"mutation orderUpdate($input: OrderInput!) {
  orderUpdate(input: $input) {
    order {
      id
      tags
    }
    userErrors {
      field
      message
    }
  }
}",
};

#[derive(Debug, Deserialize)]
struct OrdersData {
    orders: Connection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection {
    page_info: PageInfo,
    edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<PageCursor>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    node: Record,
}

#[derive(Debug, Deserialize)]
struct OrderData {
    order: Option<OrderTags>,
}

#[derive(Debug, Deserialize)]
struct OrderTags {
    #[serde(default)]
    tags: Option<TagSet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateData {
    order_update: Option<UpdatePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePayload {
    #[serde(default)]
    order: Option<OrderTags>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

/// Result of a tag mutation that reached the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagUpdate {
    /// Store accepted the new tag list; carries the echoed tags if returned
    Applied(Option<TagSet>),
    /// Store refused the input
    Rejected(Vec<UserError>),
}

/// Typed access to the store
#[derive(Debug, Clone)]
pub struct ShopApi {
    transport: Transport,
}

impl ShopApi {
    /// Create API over a transport
    #[inline]
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Underlying transport
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Fetch one page of orders
    ///
    /// # Errors
    /// Any `TransportError` from the call
    pub async fn orders_page(
        &self,
        first: usize,
        after: Option<&PageCursor>,
    ) -> Result<Page<Record>, TransportError> {
        let mut variables = json!({ "first": first });
        if let Some(cursor) = after {
            variables["after"] = json!(cursor.0);
        }

        let data: OrdersData = self.transport.execute(GET_ORDERS, variables).await?;
        Ok(Page {
            items: data.orders.edges.into_iter().map(|e| e.node).collect(),
            has_next_page: data.orders.page_info.has_next_page,
            end_cursor: data.orders.page_info.end_cursor,
        })
    }

    /// Read the tags currently stored for an order
    ///
    /// # Errors
    /// `TransportError::Malformed` when the order does not exist, or any
    /// `TransportError` from the call
    pub async fn current_tags(&self, id: &RecordId) -> Result<TagSet, TransportError> {
        let data: OrderData = self
            .transport
            .execute(GET_ORDER_TAGS, json!({ "id": id.as_str() }))
            .await?;
        let order = data
            .order
            .ok_or_else(|| TransportError::Malformed(format!("order {id} not found")))?;
        Ok(order.tags.unwrap_or_default())
    }

    /// Replace the order's tag list
    ///
    /// # Errors
    /// Any `TransportError` from the call; `TransportError::Malformed` when
    /// the mutation payload is missing
    pub async fn update_tags(
        &self,
        id: &RecordId,
        tags: &TagSet,
    ) -> Result<TagUpdate, TransportError> {
        let variables = json!({
            "input": {
                "id": id.as_str(),
                "tags": tags.as_slice(),
            }
        });
        let data: UpdateData = self.transport.execute(UPDATE_ORDER_TAGS, variables).await?;
        let payload = data
            .order_update
            .ok_or_else(|| TransportError::Malformed("orderUpdate payload missing".into()))?;

        if payload.user_errors.is_empty() {
            Ok(TagUpdate::Applied(payload.order.and_then(|o| o.tags)))
        } else {
            Ok(TagUpdate::Rejected(payload.user_errors))
        }
    }
}
