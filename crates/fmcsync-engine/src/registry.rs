//! built-in descriptors for the supported FMC object types.

use fmcsync_core::{BulkDelete, FieldSchema, FieldType, FmcVersion, ItemSchema, SchemaRegistry};

/// first release whose object endpoints accept `?bulk=true` deletes.
const BULK_DELETE_SINCE: FmcVersion = FmcVersion::new(7, 4, 0);
/// manual nat rule bulk endpoints.
const NAT_RULES_SINCE: FmcVersion = FmcVersion::new(6, 3, 0);

fn string() -> FieldSchema {
    FieldSchema::new(FieldType::String)
}

fn int() -> FieldSchema {
    FieldSchema::new(FieldType::Int)
}

fn flag() -> FieldSchema {
    FieldSchema::new(FieldType::Bool)
}

fn one_of(values: &[&str]) -> FieldSchema {
    FieldSchema::new(FieldType::Enum(
        values.iter().map(|v| v.to_string()).collect(),
    ))
}

/// reference to another object, sent as `{ "id": ... }`.
fn object_ref(remote: &str) -> FieldSchema {
    string().remote(format!("{remote}.id"))
}

/// plain named object with value, description and overridable flag.
fn value_object(path: &str, object_type: &str) -> ItemSchema {
    ItemSchema::new(path)
        .object_type(object_type)
        .bulk_delete(BulkDelete::Since(BULK_DELETE_SINCE))
        .field("value", string().required())
        .field("description", string())
        .field("overridable", flag())
}

/// all built-in item types, keyed by the name used in configuration.
pub fn builtin_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::default();

    registry.insert("hosts", value_object("/object/hosts", "Host"));
    registry.insert("networks", value_object("/object/networks", "Network"));
    registry.insert("ranges", value_object("/object/ranges", "Range"));
    registry.insert(
        "fqdn_objects",
        value_object("/object/fqdns", "FQDN").field(
            "dns_resolution",
            one_of(&["IPV4_ONLY", "IPV6_ONLY", "IPV4_AND_IPV6"]).remote("dnsResolution"),
        ),
    );
    registry.insert(
        "urls",
        ItemSchema::new("/object/urls")
            .object_type("Url")
            .bulk_delete(BulkDelete::Since(BULK_DELETE_SINCE))
            .field("url", string().required())
            .field("description", string())
            .field("overridable", flag()),
    );
    registry.insert(
        "icmpv4_objects",
        ItemSchema::new("/object/icmpv4objects")
            .object_type("ICMPV4Object")
            .bulk_delete(BulkDelete::Since(BULK_DELETE_SINCE))
            .field("icmp_type", string().remote("icmpType"))
            .field("code", int())
            .field("description", string())
            .field("overridable", flag()),
    );
    registry.insert(
        "port_objects",
        ItemSchema::new("/object/protocolportobjects")
            .object_type("ProtocolPortObject")
            .bulk_delete(BulkDelete::Since(BULK_DELETE_SINCE))
            .field("protocol", string().required())
            .field("port", string())
            .field("description", string())
            .field("overridable", flag()),
    );
    registry.insert(
        "vlan_tags",
        ItemSchema::new("/object/vlantags")
            .object_type("VlanTag")
            .bulk_delete(BulkDelete::Since(BULK_DELETE_SINCE))
            .field("start_tag", int().required().remote("data.startTag"))
            .field("end_tag", int().required().remote("data.endTag"))
            .field("description", string())
            .field("overridable", flag()),
    );
    registry.insert(
        "security_zones",
        ItemSchema::new("/object/securityzones")
            .object_type("SecurityZone")
            .bulk_delete(BulkDelete::Unsupported)
            .field(
                "interface_mode",
                one_of(&["PASSIVE", "INLINE", "SWITCHED", "ROUTED", "ASA"])
                    .required()
                    .remote("interfaceMode"),
            )
            .field("description", string()),
    );
    registry.insert("ftd_manual_nat_rules", manual_nat_rules());

    registry
}

fn manual_nat_rules() -> ItemSchema {
    ItemSchema::new("/policy/ftdnatpolicies/{parent}/manualnatrules")
        .object_type("FTDManualNatRule")
        .local_names()
        .ordered(&["before_auto", "after_auto"])
        .settle_retries()
        .min_version(NAT_RULES_SINCE)
        .bulk_delete(BulkDelete::Always)
        .field(
            "nat_type",
            one_of(&["STATIC", "DYNAMIC"]).required().remote("natType"),
        )
        .field("enabled", flag())
        .field("description", string())
        .field("original_source", object_ref("originalSource"))
        .field("original_destination", object_ref("originalDestination"))
        .field("original_source_port", object_ref("originalSourcePort"))
        .field(
            "original_destination_port",
            object_ref("originalDestinationPort"),
        )
        .field("translated_source", object_ref("translatedSource"))
        .field("translated_destination", object_ref("translatedDestination"))
        .field("translated_source_port", object_ref("translatedSourcePort"))
        .field(
            "translated_destination_port",
            object_ref("translatedDestinationPort"),
        )
        .field("source_interface", object_ref("sourceInterface"))
        .field("destination_interface", object_ref("destinationInterface"))
        .field("unidirectional", flag())
        .field("no_proxy_arp", flag().remote("noProxyArp"))
        .field("route_lookup", flag().remote("routeLookup"))
        .field(
            "interface_in_translated_source",
            flag().remote("interfaceInTranslatedSource"),
        )
        .field("dns", flag())
        .field("fallthrough", flag())
}
