//! Property tests over the pricing arithmetic: the books must balance to the
//! cent for any cart, and the commission base must never drift onto fees.

use proptest::prelude::*;
use rust_decimal::Decimal;
use tavolo_api::money::{self, compute_breakdown, from_cents, PricedLine};

fn lines_strategy() -> impl Strategy<Value = Vec<PricedLine>> {
    prop::collection::vec(
        (1i64..=100_000, 0i64..=20_000, 1i64..=20).prop_map(|(unit, options, quantity)| {
            PricedLine {
                unit_price_cents: unit,
                options_price_cents: options,
                quantity,
            }
        }),
        1..=8,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10_000))]

    #[test]
    fn total_balances_to_the_cent(
        lines in lines_strategy(),
        delivery_cents in 0i64..=2_000,
        claim_cents in 0i64..=50_000,
        balance_cents in 0i64..=50_000,
    ) {
        let breakdown = compute_breakdown(
            &lines,
            from_cents(delivery_cents),
            from_cents(claim_cents),
            from_cents(balance_cents),
        );

        // The charged total is exactly subtotal + delivery + service - credit.
        prop_assert_eq!(
            breakdown.total_cents,
            breakdown.subtotal_cents + breakdown.delivery_fee_cents
                + breakdown.service_fee_cents
                - breakdown.wallet_credit_cents
        );

        // The processor split accounts for every cent it moves.
        prop_assert_eq!(
            breakdown.restaurant_payout_cents + breakdown.commission_cents,
            breakdown.processor_charge_cents
        );

        // Decimal conversion introduces no drift.
        prop_assert_eq!(money::to_cents(breakdown.total()), breakdown.total_cents);
        prop_assert_eq!(money::to_cents(breakdown.subtotal()), breakdown.subtotal_cents);
    }

    #[test]
    fn commission_depends_only_on_the_subtotal(
        lines in lines_strategy(),
        delivery_a in 0i64..=2_000,
        delivery_b in 0i64..=2_000,
    ) {
        let a = compute_breakdown(&lines, from_cents(delivery_a), Decimal::ZERO, Decimal::ZERO);
        let b = compute_breakdown(&lines, from_cents(delivery_b), Decimal::ZERO, Decimal::ZERO);

        // Same cart, different delivery fee: identical commission.
        prop_assert_eq!(a.commission_cents, b.commission_cents);
        prop_assert_eq!(a.commission_cents, money::commission_cents(a.subtotal_cents));
    }

    #[test]
    fn wallet_credit_is_the_three_way_minimum(
        lines in lines_strategy(),
        delivery_cents in 0i64..=2_000,
        claim_cents in 0i64..=200_000,
        balance_cents in 0i64..=200_000,
    ) {
        let breakdown = compute_breakdown(
            &lines,
            from_cents(delivery_cents),
            from_cents(claim_cents),
            from_cents(balance_cents),
        );

        let order_base = breakdown.subtotal_cents + breakdown.delivery_fee_cents;
        prop_assert_eq!(
            breakdown.wallet_credit_cents,
            claim_cents.min(balance_cents).min(order_base)
        );
        // Credit can never exceed the real balance, whatever was claimed.
        prop_assert!(breakdown.wallet_credit_cents <= balance_cents);
    }
}
