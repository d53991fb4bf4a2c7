//! Parsers for the text-formatted tool results MCP servers return.
//!
//! The Xero MCP server renders records as human-readable "Key: Value"
//! blocks inside text content items, with a leading "Found N ..." summary
//! item. These parsers turn that text back into structured JSON.

use serde_json::{json, Map, Value};

/// Page size the MCP server uses; a shorter page means the last one.
pub const PAGE_SIZE: usize = 10;

/// Collect the text of every text-type content item, skipping the leading
/// "Found N ..." summary.
pub fn record_texts(result: &Value) -> Vec<&str> {
    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return Vec::new();
    };
    content
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .filter(|text| !text.is_empty() && !text.starts_with("Found"))
        .collect()
}

/// Join all text content items into one string, summaries included. Used
/// for report-style tools where the whole text is the payload.
pub fn full_text(result: &Value) -> String {
    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return String::new();
    };
    content
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_float(value: &str) -> f64 {
    value.replace(',', "").parse().unwrap_or(0.0)
}

/// Parse one invoice from its formatted text block. Returns None when the
/// block carries neither an invoice id nor a number.
pub fn parse_invoice_text(text: &str) -> Option<Value> {
    let mut invoice = Map::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "Invoice ID" => {
                invoice.insert("InvoiceID".into(), json!(value));
            }
            "Invoice" => {
                invoice.insert("InvoiceNumber".into(), json!(value));
            }
            "Reference" | "Type" | "Status" | "Date" => {
                invoice.insert(key.into(), json!(value));
            }
            "Due Date" => {
                invoice.insert("DueDate".into(), json!(value));
            }
            "Line Amount Types" => {
                invoice.insert("LineAmountTypes".into(), json!(value));
            }
            "Contact" => {
                // Format: "Contact Name (contact-id)"
                let contact = match (value.split_once('('), value.ends_with(')')) {
                    (Some((name, id)), true) => json!({
                        "Name": name.trim(),
                        "ContactID": id.trim_end_matches(')'),
                    }),
                    _ => json!({"Name": value}),
                };
                invoice.insert("Contact".into(), contact);
            }
            "Sub Total" => {
                invoice.insert("SubTotal".into(), json!(parse_float(value)));
            }
            "Total Tax" => {
                invoice.insert("TotalTax".into(), json!(parse_float(value)));
            }
            "Total" => {
                invoice.insert("Total".into(), json!(parse_float(value)));
            }
            "Total Discount" => {
                invoice.insert("TotalDiscount".into(), json!(parse_float(value)));
            }
            "Amount Due" => {
                invoice.insert("AmountDue".into(), json!(parse_float(value)));
            }
            "Amount Paid" => {
                invoice.insert("AmountPaid".into(), json!(parse_float(value)));
            }
            "Amount Credited" => {
                invoice.insert("AmountCredited".into(), json!(parse_float(value)));
            }
            "Currency" => {
                invoice.insert("CurrencyCode".into(), json!(value));
            }
            "Currency Rate" => {
                if let Ok(rate) = value.parse::<f64>() {
                    invoice.insert("CurrencyRate".into(), json!(rate));
                }
            }
            "Last Updated" => {
                invoice.insert("UpdatedDateUTC".into(), json!(value));
            }
            "Fully Paid On" => {
                let paid_on = if value.is_empty() {
                    Value::Null
                } else {
                    json!(value)
                };
                invoice.insert("FullyPaidOnDate".into(), paid_on);
            }
            "Has Errors" => {
                invoice.insert("HasErrors".into(), json!(value == "Yes"));
            }
            "Is Discounted" => {
                invoice.insert("IsDiscounted".into(), json!(value == "Yes"));
            }
            _ => {}
        }
    }

    if invoice.contains_key("InvoiceID") || invoice.contains_key("InvoiceNumber") {
        Some(Value::Object(invoice))
    } else {
        None
    }
}

/// Parse every invoice block out of a tools/call result.
pub fn parse_invoice_content(result: &Value) -> Vec<Value> {
    record_texts(result)
        .into_iter()
        .filter_map(parse_invoice_text)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_INVOICE: &str = "Invoice: INV-0042\n\
        Invoice ID: 7f4a5e1c-9f1e-4a9e-bc2f-0a1b2c3d4e5f\n\
        Reference: PO-881\n\
        Type: ACCREC\n\
        Status: AUTHORISED\n\
        Contact: Acme Pty Ltd (c0ffee00-1111-2222-3333-444455556666)\n\
        Date: 2026-07-01\n\
        Due Date: 2026-07-31\n\
        Sub Total: 1,200.00\n\
        Total Tax: 120.00\n\
        Total: 1,320.00\n\
        Amount Due: 320.00\n\
        Amount Paid: 1,000.00\n\
        Currency: AUD\n\
        Has Errors: No\n\
        Is Discounted: Yes";

    #[test]
    fn parses_full_invoice_block() {
        let invoice = parse_invoice_text(SAMPLE_INVOICE).unwrap();
        assert_eq!(invoice["InvoiceNumber"], "INV-0042");
        assert_eq!(invoice["Status"], "AUTHORISED");
        assert_eq!(invoice["Contact"]["Name"], "Acme Pty Ltd");
        assert_eq!(
            invoice["Contact"]["ContactID"],
            "c0ffee00-1111-2222-3333-444455556666"
        );
        assert_eq!(invoice["DueDate"], "2026-07-31");
        assert_eq!(invoice["SubTotal"], 1200.0);
        assert_eq!(invoice["Total"], 1320.0);
        assert_eq!(invoice["AmountDue"], 320.0);
        assert_eq!(invoice["HasErrors"], false);
        assert_eq!(invoice["IsDiscounted"], true);
    }

    #[test]
    fn contact_without_id_keeps_name_only() {
        let invoice = parse_invoice_text("Invoice: INV-1\nContact: Walk-in Customer").unwrap();
        assert_eq!(invoice["Contact"]["Name"], "Walk-in Customer");
        assert!(invoice["Contact"].get("ContactID").is_none());
    }

    #[test]
    fn unparseable_amounts_default_to_zero() {
        let invoice = parse_invoice_text("Invoice: INV-2\nTotal: not-a-number").unwrap();
        assert_eq!(invoice["Total"], 0.0);
    }

    #[test]
    fn block_without_id_or_number_is_rejected() {
        assert!(parse_invoice_text("Status: DRAFT\nTotal: 5.00").is_none());
        assert!(parse_invoice_text("").is_none());
    }

    #[test]
    fn content_parsing_skips_summary_item() {
        let result = serde_json::json!({
            "content": [
                {"type": "text", "text": "Found 2 invoices:"},
                {"type": "text", "text": "Invoice: INV-1\nTotal: 10.00"},
                {"type": "text", "text": "Invoice: INV-2\nTotal: 20.00"},
            ]
        });
        let invoices = parse_invoice_content(&result);
        assert_eq!(invoices.len(), 2);
        assert_eq!(invoices[0]["InvoiceNumber"], "INV-1");
        assert_eq!(invoices[1]["Total"], 20.0);
    }

    #[test]
    fn content_parsing_tolerates_malformed_results() {
        assert!(parse_invoice_content(&serde_json::json!({})).is_empty());
        assert!(parse_invoice_content(&serde_json::json!({"content": "oops"})).is_empty());
        assert!(parse_invoice_content(&serde_json::json!({"content": []})).is_empty());
    }

    #[test]
    fn full_text_joins_all_text_items() {
        let result = serde_json::json!({
            "content": [
                {"type": "text", "text": "Balance Sheet"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "Bank: 5,000.00"},
            ]
        });
        assert_eq!(full_text(&result), "Balance Sheet\nBank: 5,000.00");
    }
}
