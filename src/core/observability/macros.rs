/// Root span with head-based pre-sampling. The sampling decision is
/// made before any span machinery runs, so unsampled requests carry
/// zero tracing overhead. A request arriving with an active parent
/// span is always traced to keep traces complete.
///
/// Returns an un-entered span; `Span::none()` when sampled out.
#[macro_export]
macro_rules! sample_or_attach_root_span {
    ($sample_percent:expr, $span_name:literal $(, $($fields:tt)*)?) => {{
        let current = tracing::Span::current();

        if !current.is_disabled() || rand::random::<f32>() < $sample_percent {
            tracing::info_span!($span_name $(, $($fields)*)?)
        } else {
            tracing::Span::none()
        }
    }};
}

/// INFO-level child span, created only when the parent is sampled.
#[macro_export]
macro_rules! child_span_info {
    ($span_name:literal $(, $($fields:tt)*)?) => {{
        if !::tracing::Span::current().is_disabled() {
            ::tracing::info_span!($span_name $(, $($fields)*)?)
        } else {
            ::tracing::Span::none()
        }
    }};
}

/// DEBUG-level child span, created only when the parent is sampled.
#[macro_export]
macro_rules! child_span_debug {
    ($span_name:literal $(, $($fields:tt)*)?) => {{
        if !::tracing::Span::current().is_disabled() {
            ::tracing::debug_span!($span_name $(, $($fields)*)?)
        } else {
            ::tracing::Span::none()
        }
    }};
}
