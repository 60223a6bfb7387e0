//! Hickory DNS authority backed by the cluster record engine.
//!
//! The engine hands back structured payloads; this adapter projects them
//! onto wire record types. A host that parses as an IP becomes an A or
//! AAAA record; otherwise the payload is an SRV target when it carries a
//! port and a CNAME when it does not.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::{A, AAAA, CNAME, NS, PTR, SOA, SRV};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordSet, RecordType};
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupError, LookupOptions, LookupRecords, MessageRequest,
    UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::ServerConfig;
use crate::engine::DnsEngine;
use crate::error::DnsError;
use crate::metrics::{self, QueryKind, QueryResult, Timer};
use crate::records::RecordValue;

/// Authority serving the records projected by a `DnsEngine`.
pub struct ClusterAuthority {
    origin: LowerName,
    engine: Arc<DnsEngine>,
    config: Arc<ServerConfig>,
}

impl ClusterAuthority {
    /// Create a new authority for the given configuration and engine.
    pub fn new(config: ServerConfig, engine: Arc<DnsEngine>) -> Result<Self, DnsError> {
        let origin = Name::from_ascii(engine.domain())?.into();
        Ok(Self {
            origin,
            engine,
            config: Arc::new(config),
        })
    }

    /// Project a payload onto its wire record type.
    fn project(payload: &RecordValue) -> Option<(RecordType, RData)> {
        if let Ok(ip) = payload.host.parse::<IpAddr>() {
            return match ip {
                IpAddr::V4(v4) => Some((RecordType::A, RData::A(A::from(v4)))),
                IpAddr::V6(v6) => Some((RecordType::AAAA, RData::AAAA(AAAA::from(v6)))),
            };
        }
        let target = fqdn_name(&payload.host)?;
        if payload.port > 0 {
            Some((
                RecordType::SRV,
                RData::SRV(SRV::new(
                    payload.priority,
                    payload.weight,
                    payload.port,
                    target,
                )),
            ))
        } else {
            Some((RecordType::CNAME, RData::CNAME(CNAME(target))))
        }
    }

    /// Build the answer set for a forward lookup: payloads of the queried
    /// type, or the CNAME when only an alias matches.
    fn build_forward_answer(
        &self,
        name: Name,
        rtype: RecordType,
        payloads: &[Arc<RecordValue>],
    ) -> Option<RecordSet> {
        let mut direct = RecordSet::new(name.clone(), rtype, 0);
        let mut direct_count = 0usize;
        let mut cname: Option<RecordSet> = None;

        for payload in payloads {
            let Some((projected_type, rdata)) = Self::project(payload) else {
                trace!(host = %payload.host, "payload does not project onto a record type");
                continue;
            };
            if projected_type == rtype {
                let mut record = Record::from_rdata(name.clone(), payload.ttl, rdata);
                record.set_dns_class(DNSClass::IN);
                direct.insert(record, 0);
                direct_count += 1;
            } else if projected_type == RecordType::CNAME && cname.is_none() {
                let mut set = RecordSet::new(name.clone(), RecordType::CNAME, 0);
                let mut record = Record::from_rdata(name.clone(), payload.ttl, rdata);
                record.set_dns_class(DNSClass::IN);
                set.insert(record, 0);
                cname = Some(set);
            }
        }

        if direct_count > 0 {
            Some(direct)
        } else {
            cname
        }
    }

    /// Build the SOA record for this zone.
    fn build_soa_record(&self) -> RecordSet {
        let soa = SOA::new(
            Name::from_ascii(&self.config.soa.mname).unwrap_or_else(|_| Name::root()),
            Name::from_ascii(&self.config.soa.rname).unwrap_or_else(|_| Name::root()),
            self.engine.serial(),
            self.config.soa.refresh as i32,
            self.config.soa.retry as i32,
            self.config.soa.expire as i32,
            self.config.soa.minimum,
        );

        let name = Name::from(self.origin.clone());
        let mut record_set = RecordSet::new(name.clone(), RecordType::SOA, 0);
        let mut record = Record::from_rdata(name, self.config.ttl, RData::SOA(soa));
        record.set_dns_class(DNSClass::IN);
        record_set.insert(record, 0);

        record_set
    }

    /// Build an NS record for this zone.
    fn build_ns_record(&self) -> RecordSet {
        let name = Name::from(self.origin.clone());
        let ns_name = Name::from_ascii(&self.config.soa.mname).unwrap_or_else(|_| Name::root());

        let mut record_set = RecordSet::new(name.clone(), RecordType::NS, 0);
        let mut record = Record::from_rdata(name, self.config.ttl, RData::NS(NS(ns_name)));
        record.set_dns_class(DNSClass::IN);
        record_set.insert(record, 0);

        record_set
    }

    fn not_found(error: &DnsError, rtype: &str, timer: &Timer) -> LookupControlFlow<LookupRecords> {
        let outcome = match error {
            DnsError::BadRequest(_) => {
                debug!(error = %error, "unclassifiable query");
                QueryResult::BadRequest
            }
            DnsError::NotFound => QueryResult::NotFound,
            _ => QueryResult::Error,
        };
        metrics::record_query(
            if rtype == "PTR" {
                QueryKind::Reverse
            } else {
                QueryKind::Forward
            },
            outcome,
            timer.elapsed(),
        );
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NXDomain)))
    }
}

/// Parse a host into a fully qualified hickory name.
fn fqdn_name(host: &str) -> Option<Name> {
    Name::from_ascii(&format!("{}.", host.trim_end_matches('.'))).ok()
}

#[async_trait]
impl Authority for ClusterAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        let timer = Timer::start();
        let rtype_str = format!("{rtype:?}");

        if !self.engine.has_synced() {
            debug!("record engine not ready, returning SERVFAIL");
            metrics::record_query(QueryKind::Forward, QueryResult::NotReady, timer.elapsed());
            return LookupControlFlow::Break(Err(LookupError::from(io::Error::new(
                io::ErrorKind::NotConnected,
                "record engine not ready - initial sync incomplete",
            ))));
        }

        let name_str = name.to_string();
        trace!(name = %name_str, rtype = ?rtype, "DNS lookup");

        match rtype {
            RecordType::A | RecordType::AAAA | RecordType::SRV | RecordType::CNAME => {
                let payloads = match self.engine.records(&name_str, false) {
                    Ok(payloads) => payloads,
                    Err(err) => return Self::not_found(&err, &rtype_str, &timer),
                };
                let dns_name = Name::from(name.clone());
                match self.build_forward_answer(dns_name, rtype, &payloads) {
                    Some(record_set) => {
                        debug!(name = %name_str, "forward lookup: returning records");
                        metrics::record_query(
                            QueryKind::Forward,
                            QueryResult::Success,
                            timer.elapsed(),
                        );
                        LookupControlFlow::Break(Ok(LookupRecords::new(
                            lookup_options,
                            Arc::new(record_set),
                        )))
                    }
                    None => {
                        // Records exist under the name but none of this type.
                        debug!(name = %name_str, rtype = ?rtype, "forward lookup: no records of type");
                        metrics::record_query(
                            QueryKind::Forward,
                            QueryResult::NotFound,
                            timer.elapsed(),
                        );
                        LookupControlFlow::Break(Err(LookupError::ResponseCode(
                            ResponseCode::NoError,
                        )))
                    }
                }
            }
            RecordType::PTR => match self.engine.reverse_record(&name_str) {
                Ok(payload) => {
                    let Some(target) = fqdn_name(&payload.host) else {
                        return Self::not_found(&DnsError::NotFound, &rtype_str, &timer);
                    };
                    let dns_name = Name::from(name.clone());
                    let mut record_set = RecordSet::new(dns_name.clone(), RecordType::PTR, 0);
                    let mut record =
                        Record::from_rdata(dns_name, payload.ttl, RData::PTR(PTR(target)));
                    record.set_dns_class(DNSClass::IN);
                    record_set.insert(record, 0);
                    metrics::record_query(QueryKind::Reverse, QueryResult::Success, timer.elapsed());
                    LookupControlFlow::Break(Ok(LookupRecords::new(
                        lookup_options,
                        Arc::new(record_set),
                    )))
                }
                Err(err) => Self::not_found(&err, &rtype_str, &timer),
            },
            RecordType::SOA => {
                debug!(name = %name_str, "SOA lookup");
                metrics::record_query(QueryKind::Forward, QueryResult::Success, timer.elapsed());
                let record_set = Arc::new(self.build_soa_record());
                LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)))
            }
            RecordType::NS => {
                debug!(name = %name_str, "NS lookup");
                metrics::record_query(QueryKind::Forward, QueryResult::Success, timer.elapsed());
                let record_set = Arc::new(self.build_ns_record());
                LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)))
            }
            _ => {
                trace!(name = %name_str, rtype = ?rtype, "unsupported record type");
                metrics::record_query(QueryKind::Forward, QueryResult::NotFound, timer.elapsed());
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
            }
        }
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.lookup(
            request_info.query.name(),
            request_info.query.query_type(),
            lookup_options,
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        // DNSSEC not supported
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        // Dynamic updates not supported
        Err(ResponseCode::NotImp)
    }
}
