//! DNS server frontend.
//!
//! This module implements a lightweight DNS server using the
//! [hickory-dns](https://crates.io/crates/hickory-dns-server) library. The
//! server listens on a configurable UDP/TCP socket and processes queries
//! as follows:
//!
//! * **Names under a managed domain**: answered authoritatively from the
//!   record cache. Only A and AAAA queries can have answers; a name with
//!   no matching records gets NXDOMAIN.
//! * **Everything else**: forwarded to upstream resolvers using the
//!   `hickory-resolver` crate, or refused when forwarding is disabled.
//!
//! The handler only ever reads the cache; resolving a query costs one map
//! lookup no matter what state the container runtime is in.

use std::net::SocketAddr;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::proto::op::{Header, ResponseCode};
use hickory_server::proto::rr::rdata::{A, AAAA};
use hickory_server::proto::rr::{Name, RData, Record, RecordType};
use hickory_server::server::{
    Request, RequestHandler, ResponseHandler, ResponseInfo, ServerFuture,
};
use log::{error, info, warn};
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::Duration;

use crate::cache::RecordCache;
use crate::error::{Error, Result};
use crate::records::{in_domain, DnsRecord, RecordKind};

/// Timeout for idle TCP connections.
const TCP_TIMEOUT: Duration = Duration::from_secs(10);

/// TTL for answers forwarded from upstream resolvers.
const UPSTREAM_TTL: u32 = 60;

/// Start the DNS server.
pub async fn run_dns_server(
    bind_addr: SocketAddr,
    cache: RecordCache,
    domains: Vec<String>,
    ttl: u32,
    forward: bool,
) -> Result<()> {
    info!("DNS server starting on {}", bind_addr);

    // Upstream resolver for names outside the managed domains.
    let resolver = if forward {
        match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => Some(resolver),
            Err(e) => {
                error!(
                    "failed to load system resolv.conf, upstream forwarding disabled: {}",
                    e
                );
                None
            }
        }
    } else {
        None
    };

    let handler = MoordnsHandler {
        cache,
        domains,
        resolver,
        ttl,
    };
    let mut server = ServerFuture::new(handler);

    let udp = UdpSocket::bind(bind_addr).await?;
    server.register_socket(udp);

    let tcp = TcpListener::bind(bind_addr).await?;
    server.register_listener(tcp, TCP_TIMEOUT);

    server
        .block_until_done()
        .await
        .map_err(|e| Error::Server(e.to_string()))
}

struct MoordnsHandler {
    cache: RecordCache,
    domains: Vec<String>,
    resolver: Option<TokioAsyncResolver>,
    ttl: u32,
}

impl MoordnsHandler {
    /// Records answering a managed-domain query, already kind-filtered.
    async fn answer(&self, qname: &str, qtype: RecordType) -> Vec<DnsRecord> {
        match record_kind(qtype) {
            Some(kind) => self.cache.resolve(qname, kind).await,
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl RequestHandler for MoordnsHandler {
    async fn handle_request<R>(&self, request: &Request, mut response_handle: R) -> ResponseInfo
    where
        R: ResponseHandler + Send,
    {
        let query = request.query();
        // LowerName renders lowercased with the trailing dot, which is
        // exactly the cache key form.
        let qname = query.name().to_string();
        let qtype = query.query_type();

        let mut header = Header::response_from_request(request.header());
        header.set_recursion_available(self.resolver.is_some());

        // Managed domains are answered from the cache, authoritatively.
        if self.domains.iter().any(|d| in_domain(&qname, d)) {
            header.set_authoritative(true);

            let answers = self.answer(&qname, qtype).await;
            if answers.is_empty() {
                header.set_response_code(ResponseCode::NXDomain);
                let builder = MessageResponseBuilder::from_message_request(request);
                let response = builder.build_no_records(header);
                return match response_handle.send_response(response).await {
                    Ok(info) => info,
                    Err(e) => {
                        error!("failed to send DNS response: {}", e);
                        serve_failed()
                    }
                };
            }

            let name: Name = query.name().clone().into();
            let records: Vec<Record> = answers
                .iter()
                .map(|r| Record::from_rdata(name.clone(), self.ttl, rdata(r)))
                .collect();
            let builder = MessageResponseBuilder::from_message_request(request);
            let response = builder.build(
                header,
                records.iter(),
                std::iter::empty(),
                std::iter::empty(),
                std::iter::empty(),
            );
            return match response_handle.send_response(response).await {
                Ok(info) => info,
                Err(e) => {
                    error!("failed to send DNS response: {}", e);
                    serve_failed()
                }
            };
        }

        // Not ours: forward upstream when enabled.
        let Some(resolver) = &self.resolver else {
            header.set_response_code(ResponseCode::Refused);
            let builder = MessageResponseBuilder::from_message_request(request);
            let response = builder.build_no_records(header);
            return match response_handle.send_response(response).await {
                Ok(info) => info,
                Err(e) => {
                    error!("failed to send DNS response: {}", e);
                    serve_failed()
                }
            };
        };

        match resolver.lookup_ip(qname.clone()).await {
            Ok(lookup) => {
                let name: Name = query.name().clone().into();
                let mut records = Vec::new();
                for addr in lookup.iter() {
                    match (addr, qtype) {
                        (std::net::IpAddr::V4(ipv4), RecordType::A) => {
                            records.push(Record::from_rdata(
                                name.clone(),
                                UPSTREAM_TTL,
                                RData::A(A(ipv4)),
                            ));
                        }
                        (std::net::IpAddr::V6(ipv6), RecordType::AAAA) => {
                            records.push(Record::from_rdata(
                                name.clone(),
                                UPSTREAM_TTL,
                                RData::AAAA(AAAA(ipv6)),
                            ));
                        }
                        _ => {}
                    }
                }
                let builder = MessageResponseBuilder::from_message_request(request);
                let response = builder.build(
                    header,
                    records.iter(),
                    std::iter::empty(),
                    std::iter::empty(),
                    std::iter::empty(),
                );
                match response_handle.send_response(response).await {
                    Ok(info) => info,
                    Err(e) => {
                        error!("failed to send DNS response: {}", e);
                        serve_failed()
                    }
                }
            }
            Err(e) => {
                warn!("upstream lookup failed for {}: {}", qname, e);
                header.set_response_code(ResponseCode::ServFail);
                let builder = MessageResponseBuilder::from_message_request(request);
                let response = builder.build_no_records(header);
                match response_handle.send_response(response).await {
                    Ok(info) => info,
                    Err(e) => {
                        error!("failed to send DNS response: {}", e);
                        serve_failed()
                    }
                }
            }
        }
    }
}

/// The record kinds a query type can match. Anything but A/AAAA has no
/// answers here.
fn record_kind(qtype: RecordType) -> Option<RecordKind> {
    match qtype {
        RecordType::A => Some(RecordKind::A),
        RecordType::AAAA => Some(RecordKind::Aaaa),
        _ => None,
    }
}

fn rdata(record: &DnsRecord) -> RData {
    match record.addr {
        std::net::IpAddr::V4(ipv4) => RData::A(A(ipv4)),
        std::net::IpAddr::V6(ipv6) => RData::AAAA(AAAA(ipv6)),
    }
}

fn serve_failed() -> ResponseInfo {
    let mut header = Header::new();
    header.set_response_code(ResponseCode::ServFail);
    header.into()
}
