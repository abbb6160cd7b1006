pub mod creatives;
pub mod media_buy;

#[cfg(test)]
pub(crate) mod testkit;
