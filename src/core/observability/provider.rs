use crate::app::config::{FileRotation, LogType, LoggingConfig, OtelProto};
use anyhow::{Context, Result, anyhow};
use opentelemetry::trace::TracerProvider;
use opentelemetry::{KeyValue, global};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use std::path::Path;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

type DynLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync + 'static>;

/// Wires the tracing subscriber from the configured sinks. Returns the
/// OTLP tracer provider when one was configured so shutdown can flush
/// it.
pub fn init(config: &LoggingConfig) -> Result<Option<SdkTracerProvider>> {
    config.validate()?;

    let crate_name = env!("CARGO_PKG_NAME");
    let filter = EnvFilter::from_default_env()
        .add_directive("error".parse()?)
        .add_directive("audit=info".parse()?)
        .add_directive(format!("{}={}", crate_name, config.level).parse()?);

    let mut layers: Vec<DynLayer> = Vec::new();
    let mut otel_provider: Option<SdkTracerProvider> = None;

    for sink in &config.sinks {
        match &sink.dest {
            LogType::Stdout { color, json } => {
                let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
                std::mem::forget(guard);
                layers.push(fmt_layer(writer, *json, *color, sink.spans));
            }
            LogType::File {
                path,
                json,
                rotation,
                max_files,
            } => {
                let writer = file_writer(path, rotation, *max_files)?;
                layers.push(fmt_layer(writer, *json, false, sink.spans));
            }
            LogType::Otel { endpoint, proto } => {
                if otel_provider.is_some() {
                    return Err(anyhow!("Multiple OTLP sinks configured. Only one is supported."));
                }

                let (layer, provider) = otel_layer(endpoint, proto, config.span_sample_rate)?;
                layers.push(layer);
                otel_provider = Some(provider);
            }
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    if let Some(provider) = &otel_provider {
        global::set_text_map_propagator(TraceContextPropagator::new());
        let _ = global::set_tracer_provider(provider.clone());
    }

    Ok(otel_provider)
}

pub fn shutdown(provider: &SdkTracerProvider) -> Result<()> {
    provider.shutdown().context("failed to shutdown tracer provider")
}

fn fmt_layer(
    writer: tracing_appender::non_blocking::NonBlocking,
    json: bool,
    color: bool,
    spans: bool,
) -> DynLayer {
    let span_events = if spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if json {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_span_events(span_events)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_ansi(color)
            .with_writer(writer)
            .with_span_events(span_events)
            .boxed()
    }
}

fn file_writer(
    path: &Path,
    rotation: &FileRotation,
    max_files: usize,
) -> Result<tracing_appender::non_blocking::NonBlocking> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid file name in path: {}", path.display()))?;

    let directory = path
        .parent()
        .ok_or_else(|| anyhow!("Invalid directory in path: {}", path.display()))?;

    if !directory.as_os_str().is_empty() {
        std::fs::create_dir_all(directory)
            .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    }

    let appender = match rotation {
        FileRotation::Daily => tracing_appender::rolling::daily(directory, file_name),
        FileRotation::Hourly => tracing_appender::rolling::hourly(directory, file_name),
        FileRotation::Never => tracing_appender::rolling::never(directory, file_name),
    };

    let (writer, guard) = tracing_appender::non_blocking(appender);
    std::mem::forget(guard);

    prune_rotated_files(directory, file_name, max_files)?;

    Ok(writer)
}

fn prune_rotated_files(directory: &Path, prefix: &str, max_files: usize) -> Result<()> {
    if max_files == 0 {
        return Ok(());
    }

    let mut files: Vec<_> = std::fs::read_dir(directory)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(prefix))
                .unwrap_or(false)
        })
        .filter_map(|entry| {
            entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok().map(|time| (entry.path(), time)))
        })
        .collect();

    if files.len() <= max_files {
        return Ok(());
    }

    files.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in files.iter().skip(max_files) {
        let _ = std::fs::remove_file(path);
    }

    Ok(())
}

fn otel_layer(
    endpoint: &str,
    proto: &OtelProto,
    sample_rate: f32,
) -> Result<(DynLayer, SdkTracerProvider)> {
    use opentelemetry_otlp::WithExportConfig;

    let exporter = match proto {
        OtelProto::Grpc => {
            let mut builder = opentelemetry_otlp::SpanExporter::builder().with_tonic();
            if !endpoint.is_empty() {
                builder = builder.with_endpoint(endpoint);
            }
            builder.build().context("failed to build OTLP gRPC exporter")?
        }
        OtelProto::Http => http_exporter(endpoint)?,
    };

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string());
    let resource = Resource::builder()
        .with_service_name(service_name)
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build();

    let provider = SdkTracerProvider::builder()
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
            sample_rate as f64,
        ))))
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build();

    let tracer = provider.tracer(env!("CARGO_PKG_NAME"));
    let layer = tracing_opentelemetry::layer().with_tracer(tracer).boxed();

    Ok((layer, provider))
}

#[cfg(feature = "otel-http")]
fn http_exporter(endpoint: &str) -> Result<opentelemetry_otlp::SpanExporter> {
    use opentelemetry_otlp::WithExportConfig;

    let mut builder = opentelemetry_otlp::SpanExporter::builder().with_http();
    if !endpoint.is_empty() {
        builder = builder.with_endpoint(endpoint);
    }

    builder.build().context("failed to build OTLP HTTP exporter")
}

#[cfg(not(feature = "otel-http"))]
fn http_exporter(_: &str) -> Result<opentelemetry_otlp::SpanExporter> {
    Err(anyhow!(
        "OTLP HTTP exporter requested but the build does not enable the `otel-http` feature"
    ))
}
