//! Bill notice text sent to consumers after generation.

use rust_decimal::Decimal;
use serde::Serialize;

use super::ledger::service_fee;
use super::month::due_date;
use crate::models::{Bill, Consumer, RatesInfo};

/// Subject and bodies of a bill notice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillNotice {
    pub subject: String,
    pub email_body: String,
    pub sms_body: String,
    /// Amount due when paying by cash on or before the due date.
    pub amount_due: Decimal,
    /// Amount due through GCash or Maya, service fee included.
    pub e_wallet_amount: Decimal,
    /// Amount due after the due date.
    pub late_amount: Decimal,
}

impl BillNotice {
    pub fn compose(consumer: &Consumer, bill: &Bill, rates: &RatesInfo, cubic_used: Decimal) -> Self {
        let amount_due = bill.total_amount;
        let e_wallet_amount = amount_due + service_fee(amount_due);
        let late_amount = amount_due + rates.penalty_rate;

        let period = bill.month_year.format("%B %Y").to_string();
        let due = due_date(bill.month_year).format("%b %d, %Y").to_string();

        let subject = format!("Water bill for {}", period);

        let mut email_body = format!(
            "Dear {name},\n\n\
             Your water bill for {period} is ready.\n\n\
             Meter number: {meter}\n\
             Consumption: {cubic} cu.m.\n\
             Subsidy: -{subsidy:.2}\n\
             System loss: {loss:.2}\n",
            name = consumer.name,
            period = period,
            meter = consumer.meter_number,
            cubic = cubic_used,
            subsidy = bill.subsidy,
            loss = bill.system_loss,
        );
        if !bill.balance.is_zero() {
            email_body.push_str(&format!("Previous balance: {:.2}\n", bill.balance));
        }
        email_body.push_str(&format!(
            "Total amount due: PHP {amount:.2}\n\n\
             Please pay on or before {due}. Payments after the due date are PHP {late:.2}.\n\
             Paying through GCash or Maya: PHP {wallet:.2} (service fee included).\n",
            amount = amount_due,
            due = due,
            late = late_amount,
            wallet = e_wallet_amount,
        ));

        let sms_body = format!(
            "Hi {}, your {} water bill is PHP {:.2} ({} cu.m.). Due {}. Late: PHP {:.2}. GCash/Maya: PHP {:.2}.",
            consumer.name, period, amount_due, cubic_used, due, late_amount, e_wallet_amount
        );

        Self {
            subject,
            email_body,
            sms_body,
            amount_due,
            e_wallet_amount,
            late_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillStatus, ConsumerStatus, NotifStatus, NotificationPreference};
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn consumer() -> Consumer {
        Consumer {
            consumer_id: Uuid::new_v4(),
            name: "Maria Santos".to_string(),
            meter_number: "MTR-0042".to_string(),
            status: ConsumerStatus::Active,
            notification_preference: NotificationPreference::Both,
            email: Some("maria@example.com".to_string()),
            phone: Some("+639170000000".to_string()),
            created_utc: Utc::now(),
        }
    }

    fn bill(total: Decimal, balance: Decimal) -> Bill {
        Bill {
            bill_id: Uuid::new_v4(),
            consumer_id: Uuid::new_v4(),
            reading_id: Uuid::new_v4(),
            mother_reading_id: Uuid::new_v4(),
            month_year: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            billing_date: Utc::now(),
            system_loss: dec!(12.50),
            subsidy: dec!(10),
            balance,
            total_amount: total,
            status: BillStatus::Unpaid,
            notif_status: NotifStatus::Pending,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    fn rates() -> crate::models::RatesInfo {
        crate::models::RatesInfo {
            rates_id: Uuid::new_v4(),
            consumer_rate: dec!(25),
            mother_meter_rate: dec!(20),
            penalty_rate: dec!(50),
            subsidy_rate: dec!(2),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn e_wallet_amount_includes_service_fee() {
        let notice = BillNotice::compose(&consumer(), &bill(dec!(1000), dec!(0)), &rates(), dec!(40));

        assert_eq!(notice.amount_due, dec!(1000));
        assert_eq!(notice.e_wallet_amount, dec!(1010));
        assert_eq!(notice.late_amount, dec!(1050));
        assert!(notice.sms_body.contains("GCash/Maya: PHP 1010.00"));
        assert!(notice.email_body.contains("March 20, 2024") || notice.email_body.contains("Mar 20, 2024"));
    }

    #[test]
    fn fee_rounds_up_to_the_next_peso() {
        let notice = BillNotice::compose(&consumer(), &bill(dec!(1001.50), dec!(0)), &rates(), dec!(40));
        // ceil(10.015) = 11
        assert_eq!(notice.e_wallet_amount, dec!(1012.50));
    }

    #[test]
    fn balance_line_only_when_carried_over() {
        let without = BillNotice::compose(&consumer(), &bill(dec!(500), dec!(0)), &rates(), dec!(10));
        let with = BillNotice::compose(&consumer(), &bill(dec!(800), dec!(300)), &rates(), dec!(10));

        assert!(!without.email_body.contains("Previous balance"));
        assert!(with.email_body.contains("Previous balance: 300.00"));
        assert_eq!(with.subject, "Water bill for March 2024");
    }
}
