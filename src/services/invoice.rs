use crate::entities::{OrderItemModel, OrderModel};
use rust_decimal::Decimal;
use std::fmt::Write;
use uuid::Uuid;

/// Renders the invoice document for an order.
///
/// The output is a deterministic function of the order's stored snapshot
/// data alone; the catalog is never consulted, so later price edits or
/// product deletions cannot change a rendered invoice.
pub fn render_invoice(order: &OrderModel, items: &[OrderItemModel]) -> String {
    let mut doc = String::new();
    doc.push_str("Invoice\n");
    doc.push_str("-----------------------\n");

    let mut total = Decimal::ZERO;
    for item in items {
        total += item.price * Decimal::from(item.quantity);
        let _ = writeln!(
            doc,
            "{} - {} x ${}",
            item.title,
            item.quantity,
            item.price.normalize()
        );
    }

    doc.push_str("---\n");
    let _ = writeln!(doc, "Total Price: $ {}", total.normalize());
    let _ = writeln!(doc, "Order: {}", order.id);
    let _ = writeln!(doc, "Billed to: {}", order.user_email);
    doc
}

/// File name the invoice is served under.
pub fn invoice_filename(order_id: Uuid) -> String {
    format!("invoice-{}.txt", order_id)
}
