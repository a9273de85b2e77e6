//! End-to-end: pricing the credit risk of an invoice.
//!
//! The invoice only carries a client id and an AUD amount. Pricing needs a
//! GBP amount and a SIC2003 industry code, so the engine must look the
//! client up, convert its SIC2008 code, and convert the amount to GBP
//! before it can call the credit cost service.

use std::sync::Arc;

use fedql::constraint::Constraint;
use fedql::error::TransportError;
use fedql::schema::{Argument, Field, Operation, Parameter, PrimitiveKind, Service, Type};
use fedql::{
    DataSource, Engine, FedError, QualifiedName, ResolutionError, SchemaBuilder, SchemaProvider, StubInvoker,
    TypedInstance, Value,
};
use serde_json::json;

fn name(raw: &str) -> QualifiedName {
    raw.parse().unwrap()
}

fn schema() -> Arc<dyn SchemaProvider> {
    let schema = SchemaBuilder::new()
        .add_type(Type::scalar(name("vyne.creditInc.ClientId"), PrimitiveKind::String))
        .add_type(Type::scalar(name("vyne.creditInc.ClientName"), PrimitiveKind::String))
        .add_type(Type::scalar(name("vyne.creditInc.SettlementDate"), PrimitiveKind::Date))
        .add_type(Type::scalar(name("vyne.creditInc.Currency"), PrimitiveKind::String))
        .add_type(Type::scalar(name("vyne.creditInc.MoneyAmount"), PrimitiveKind::Decimal))
        .add_type(Type::scalar(name("vyne.creditInc.CreditRiskCost"), PrimitiveKind::Decimal))
        .add_type(Type::scalar(name("isic.uk.SIC2003"), PrimitiveKind::String))
        .add_type(Type::scalar(name("isic.uk.SIC2008"), PrimitiveKind::String))
        .add_type(Type::object(
            name("vyne.creditInc.Client"),
            vec![
                Field::new("clientId", name("vyne.creditInc.ClientId")),
                Field::new("clientName", name("vyne.creditInc.ClientName")),
                Field::new("sicCode", name("isic.uk.SIC2008")),
            ],
        ))
        .add_type(Type::object(
            name("vyne.creditInc.Money"),
            vec![
                Field::new("currency", name("vyne.creditInc.Currency")),
                Field::new("value", name("vyne.creditInc.MoneyAmount")),
            ],
        ))
        .add_type(Type::object(
            name("vyne.creditInc.Invoice"),
            vec![
                Field::new("clientId", name("vyne.creditInc.ClientId")),
                Field::new("settlementDate", name("vyne.creditInc.SettlementDate")),
                Field::new("amount", name("vyne.creditInc.Money")),
            ],
        ))
        .add_type(
            Type::object(
                name("vyne.creditInc.CreditCostRequest"),
                vec![
                    Field::new("invoiceValue", name("vyne.creditInc.Money")).with_constraint(
                        Constraint::ConstantValue {
                            attribute: "currency".to_string(),
                            value: Value::from("GBP"),
                        },
                    ),
                    Field::new("industryCode", name("isic.uk.SIC2003")),
                ],
            )
            .as_parameter_type(),
        )
        .add_type(Type::object(
            name("vyne.creditInc.CreditCostResponse"),
            vec![Field::new("cost", name("vyne.creditInc.CreditRiskCost"))],
        ))
        .add_service(
            Service::new(name("vyne.creditInc.ClientLookupService")).with_operation(
                Operation::new(
                    name("vyne.creditInc.ClientLookupService"),
                    "findClientById",
                    name("vyne.creditInc.Client"),
                )
                .with_parameter(Parameter::new(name("vyne.creditInc.ClientId"))),
            ),
        )
        .add_service(
            Service::new(name("vyne.creditInc.RateConversionService")).with_operation(
                Operation::new(
                    name("vyne.creditInc.RateConversionService"),
                    "convertRates",
                    name("vyne.creditInc.Money"),
                )
                .with_parameter(Parameter::named("source", name("vyne.creditInc.Money")))
                .with_parameter(Parameter::named("targetCurrency", name("vyne.creditInc.Currency")))
                .with_return_constraint(Constraint::ReturnDerivedFromParameter {
                    parameter: "source".to_string(),
                })
                .with_return_constraint(Constraint::ValueFromParameter {
                    attribute: "currency".to_string(),
                    parameter: "targetCurrency".to_string(),
                }),
            ),
        )
        .add_service(
            Service::new(name("vyne.creditInc.CreditCostService")).with_operation(
                Operation::new(
                    name("vyne.creditInc.CreditCostService"),
                    "calculateCreditCosts",
                    name("vyne.creditInc.CreditCostResponse"),
                )
                .with_parameter(Parameter::new(name("vyne.creditInc.CreditCostRequest"))),
            ),
        )
        .add_service(
            Service::new(name("isic.uk.IsicConversionService"))
                .with_operation(
                    Operation::new(name("isic.uk.IsicConversionService"), "toSic2003", name("isic.uk.SIC2003"))
                        .with_parameter(Parameter::new(name("isic.uk.SIC2008"))),
                )
                .with_operation(
                    Operation::new(name("isic.uk.IsicConversionService"), "toSic2008", name("isic.uk.SIC2008"))
                        .with_parameter(Parameter::new(name("isic.uk.SIC2003"))),
                ),
        )
        .build()
        .unwrap();
    Arc::new(schema)
}

fn parse(schema: &dyn SchemaProvider, type_name: &str, payload: &serde_json::Value) -> TypedInstance {
    TypedInstance::from_json(schema, &name(type_name), payload, DataSource::Undefined).unwrap()
}

fn invoice(schema: &dyn SchemaProvider, currency: &str, value: &str) -> TypedInstance {
    TypedInstance::from_json(
        schema,
        &name("vyne.creditInc.Invoice"),
        &json!({
            "clientId": "jim01",
            "settlementDate": "2017-10-20",
            "amount": { "currency": currency, "value": value }
        }),
        DataSource::Provided,
    )
    .unwrap()
}

/// Registers every operation the search can reach.
fn stubs(schema: &dyn SchemaProvider) -> Arc<StubInvoker> {
    let stub = Arc::new(StubInvoker::new());
    stub.add_response(
        "findClientById",
        vec![parse(
            schema,
            "vyne.creditInc.Client",
            &json!({"clientId": "jim01", "clientName": "Jim's Bar & Grill", "sicCode": "2008-123456"}),
        )],
    );
    stub.add_response("toSic2003", vec![parse(schema, "isic.uk.SIC2003", &json!("2003"))]);
    stub.add_response("toSic2008", Vec::new());
    stub.add_response(
        "convertRates",
        vec![parse(
            schema,
            "vyne.creditInc.Money",
            &json!({"currency": "GBP", "value": "10.00"}),
        )],
    );
    stub.add_response(
        "calculateCreditCosts",
        vec![parse(schema, "vyne.creditInc.CreditCostResponse", &json!({"cost": "250.00"}))],
    );
    stub
}

fn scalar_at<'a>(arguments: &'a [Argument], parameter: &str, path: &str) -> &'a Value {
    let argument = Argument::find(arguments, parameter).unwrap();
    let value = if path.is_empty() {
        &argument.value
    } else {
        argument.value.path(path).unwrap()
    };
    value.scalar_value().unwrap()
}

#[test]
fn credit_cost_resolved_through_lookup_and_conversions() {
    let schema = schema();
    let stub = stubs(schema.as_ref());
    let engine = Engine::builder(Arc::clone(&schema)).invoker(stub.clone()).build().unwrap();
    let ctx = engine.query_context(vec![invoice(schema.as_ref(), "AUD", "20.55")]).unwrap();

    let results = engine
        .find(&ctx, &name("vyne.creditInc.CreditRiskCost"))
        .collect_all()
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].type_name, name("vyne.creditInc.CreditRiskCost"));
    assert_eq!(results[0].scalar_value().and_then(Value::as_float), Some(250.0));

    let lookups = stub.invocations("findClientById");
    assert_eq!(lookups.len(), 1);
    assert_eq!(lookups[0][0].value.scalar_value(), Some(&Value::from("jim01")));

    let sic = stub.invocations("toSic2003");
    assert_eq!(sic.len(), 1);
    assert_eq!(sic[0][0].value.scalar_value(), Some(&Value::from("2008-123456")));

    let conversions = stub.invocations("convertRates");
    assert_eq!(conversions.len(), 1);
    assert_eq!(scalar_at(&conversions[0], "source", "currency"), &Value::from("AUD"));
    assert_eq!(scalar_at(&conversions[0], "source", "value").as_float(), Some(20.55));
    assert_eq!(scalar_at(&conversions[0], "targetCurrency", ""), &Value::from("GBP"));

    let pricing = stub.invocations("calculateCreditCosts");
    assert_eq!(pricing.len(), 1);
    let request = &pricing[0][0].value;
    assert_eq!(request.type_name, name("vyne.creditInc.CreditCostRequest"));
    assert_eq!(
        request.path("invoiceValue.currency").unwrap().scalar_value(),
        Some(&Value::from("GBP"))
    );
    assert_eq!(
        request.path("invoiceValue.value").unwrap().scalar_value().and_then(Value::as_float),
        Some(10.0)
    );
    assert_eq!(
        request.path("industryCode").unwrap().scalar_value(),
        Some(&Value::from("2003"))
    );

    // SIC2003 -> SIC2008 -> SIC2003 is a cycle; the back edge is never taken.
    assert_eq!(stub.invocation_count("toSic2008"), 0);

    let stats = ctx.statistics().snapshot();
    assert_eq!(stats.remote_calls, 4);
    assert_eq!(stats.failed_remote_calls, 0);
}

#[test]
fn amount_already_in_gbp_needs_no_conversion() {
    let schema = schema();
    let stub = stubs(schema.as_ref());
    let engine = Engine::builder(Arc::clone(&schema)).invoker(stub.clone()).build().unwrap();
    let ctx = engine.query_context(vec![invoice(schema.as_ref(), "GBP", "20.55")]).unwrap();

    let results = engine
        .find(&ctx, &name("vyne.creditInc.CreditRiskCost"))
        .collect_all()
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(stub.invocation_count("convertRates"), 0);

    let pricing = stub.invocations("calculateCreditCosts");
    let request = &pricing[0][0].value;
    assert_eq!(
        request.path("invoiceValue.value").unwrap().scalar_value().and_then(Value::as_float),
        Some(20.55)
    );
}

#[test]
fn failed_client_lookup_leaves_cost_unresolved() {
    let schema = schema();
    let stub = stubs(schema.as_ref());
    stub.add_handler("findClientById", |_, _| {
        Err(TransportError::ServerError {
            code: 503,
            message: "client directory unavailable".to_string(),
        })
    });
    let engine = Engine::builder(Arc::clone(&schema)).invoker(stub.clone()).build().unwrap();
    let ctx = engine.query_context(vec![invoice(schema.as_ref(), "AUD", "20.55")]).unwrap();

    let err = engine
        .find(&ctx, &name("vyne.creditInc.CreditRiskCost"))
        .collect_all()
        .unwrap_err();
    match err {
        FedError::Resolution(ResolutionError::TargetNotFound { target, attempts }) => {
            assert_eq!(target, name("vyne.creditInc.CreditRiskCost"));
            assert_eq!(
                attempts,
                vec!["vyne.creditInc.CreditCostService@@calculateCreditCosts".to_string()]
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(stub.invocation_count("calculateCreditCosts"), 0);
    assert!(ctx.statistics().snapshot().failed_remote_calls >= 1);
}
