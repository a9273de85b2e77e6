//! Shared schema and stubs for resolver unit tests.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::constraint::Constraint;
use crate::context::QueryContext;
use crate::instance::{DataSource, TypedInstance};
use crate::invoker::{InvokerPool, OperationInvoker, StubInvoker};
use crate::resolver::Resolver;
use crate::schema::{Field, InMemorySchema, Operation, Parameter, PrimitiveKind, QualifiedName, SchemaBuilder, Service, Type};
use crate::value::Value;

pub(crate) fn name(raw: &str) -> QualifiedName {
    QualifiedName::parse(raw).unwrap()
}

pub(crate) fn schema() -> InMemorySchema {
    SchemaBuilder::new()
        .add_type(Type::scalar(name("demo.ClientId"), PrimitiveKind::String))
        .add_type(Type::scalar(name("demo.ClientName"), PrimitiveKind::String))
        .add_type(Type::scalar(name("isic.SIC2003"), PrimitiveKind::String))
        .add_type(Type::scalar(name("isic.SIC2008"), PrimitiveKind::String))
        .add_type(Type::scalar(name("demo.Currency"), PrimitiveKind::String))
        .add_type(Type::scalar(name("demo.MoneyAmount"), PrimitiveKind::Decimal))
        .add_type(Type::object(
            name("demo.Client"),
            vec![
                Field::new("clientId", name("demo.ClientId")),
                Field::new("clientName", name("demo.ClientName")),
                Field::new("sicCode", name("isic.SIC2008")),
            ],
        ))
        .add_type(Type::object(
            name("demo.Money"),
            vec![
                Field::new("currency", name("demo.Currency")),
                Field::new("value", name("demo.MoneyAmount")),
            ],
        ))
        .add_service(
            Service::new(name("demo.ClientLookupService")).with_operation(
                Operation::new(name("demo.ClientLookupService"), "findClientById", name("demo.Client"))
                    .with_parameter(Parameter::new(name("demo.ClientId"))),
            ),
        )
        .add_service(
            Service::new(name("isic.IsicConversionService"))
                .with_operation(
                    Operation::new(name("isic.IsicConversionService"), "toSic2003", name("isic.SIC2003"))
                        .with_parameter(Parameter::new(name("isic.SIC2008"))),
                )
                .with_operation(
                    Operation::new(name("isic.IsicConversionService"), "toSic2008", name("isic.SIC2008"))
                        .with_parameter(Parameter::new(name("isic.SIC2003"))),
                ),
        )
        .add_service(
            Service::new(name("demo.RateConversionService")).with_operation(
                Operation::new(name("demo.RateConversionService"), "convertRates", name("demo.Money"))
                    .with_parameter(Parameter::named("source", name("demo.Money")))
                    .with_parameter(Parameter::named("targetCurrency", name("demo.Currency")))
                    .with_return_constraint(Constraint::ReturnDerivedFromParameter {
                        parameter: "source".to_string(),
                    })
                    .with_return_constraint(Constraint::ValueFromParameter {
                        attribute: "currency".to_string(),
                        parameter: "targetCurrency".to_string(),
                    }),
            ),
        )
        .build()
        .unwrap()
}

pub(crate) fn client(id: &str, sic: &str) -> TypedInstance {
    TypedInstance::object(
        name("demo.Client"),
        [
            (
                "clientId".to_string(),
                TypedInstance::scalar(name("demo.ClientId"), id, DataSource::Provided),
            ),
            (
                "clientName".to_string(),
                TypedInstance::scalar(name("demo.ClientName"), "Jim's Bar & Grill", DataSource::Provided),
            ),
            (
                "sicCode".to_string(),
                TypedInstance::scalar(name("isic.SIC2008"), sic, DataSource::Provided),
            ),
        ],
        DataSource::Provided,
    )
}

pub(crate) fn money(currency: &str, value: f64) -> TypedInstance {
    TypedInstance::object(
        name("demo.Money"),
        [
            (
                "currency".to_string(),
                TypedInstance::scalar(name("demo.Currency"), currency, DataSource::Provided),
            ),
            (
                "value".to_string(),
                TypedInstance::scalar(name("demo.MoneyAmount"), Value::Float(value), DataSource::Provided),
            ),
        ],
        DataSource::Provided,
    )
}

pub(crate) fn resolver_with(stub: &Arc<StubInvoker>) -> (Resolver, QueryContext) {
    let invoker: Arc<dyn OperationInvoker> = stub.clone();
    let resolver = Resolver::new(InvokerPool::new(vec![invoker]), EngineConfig::default());
    (resolver, QueryContext::new(Arc::new(schema())))
}
