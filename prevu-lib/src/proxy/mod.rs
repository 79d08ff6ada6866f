mod proxy_main;
mod socket;

pub(crate) use proxy_main::ProxyBuilder;
