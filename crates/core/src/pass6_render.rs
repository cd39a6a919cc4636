//! Pass 6: Manifest rendering -- validated records to ordered, block-style
//! YAML text.
//!
//! Every key is inserted in a fixed order per kind, and a key is only
//! inserted when its value is present and, for collections and nested
//! records, non-empty. `serde_yaml` keeps mapping insertion order and emits
//! block style, so the text is stable across runs.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use crate::error::ComposeError;
use crate::model::*;
use crate::pass5_validate::Validated;

/// One rendered resource, ready for the I/O layer to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub kind: ResourceKind,
    pub name: String,
    /// `<kind-postfix>-<name>.yaml`
    pub file_name: String,
    pub text: String,
}

pub fn manifest_file_name(kind: ResourceKind, name: &str) -> String {
    format!("{}-{}.yaml", kind.postfix(), name)
}

/// Render to text.
pub fn render(validated: &Validated) -> Result<Manifest, ComposeError> {
    let record = validated.record();
    let value = render_value(validated);
    let text = serde_yaml::to_string(&value).map_err(|e| ComposeError::Render {
        kind: record.kind().as_str().to_owned(),
        resource: record.name.clone(),
        message: e.to_string(),
    })?;
    Ok(Manifest {
        kind: record.kind(),
        name: record.name.clone(),
        file_name: manifest_file_name(record.kind(), &record.name),
        text,
    })
}

/// Render to the ordered mapping, before serialization.
pub fn render_value(validated: &Validated) -> Value {
    let record = validated.record();
    let mut root = Obj::new();
    root.put("apiVersion", record.kind().api_version());
    root.put("kind", record.kind().as_str());
    root.put_obj("metadata", metadata(record));
    let spec = match &record.spec {
        ResourceSpec::Gateway(g) => gateway(g),
        ResourceSpec::VirtualService(vs) => virtual_service(vs),
        ResourceSpec::Service(s) => service(s),
        ResourceSpec::Deployment(d) => deployment(d),
        ResourceSpec::Route(r) => route(r),
        ResourceSpec::BuildConfig(b) => build_config(b),
    };
    root.put_obj("spec", spec);
    root.into_value()
}

// ──────────────────────────────────────────────
// Conditional mapping builder
// ──────────────────────────────────────────────

/// An insertion-ordered mapping that drops absent and empty values.
struct Obj(Mapping);

impl Obj {
    fn new() -> Self {
        Obj(Mapping::new())
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn put(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(Value::from(key), value.into());
    }

    fn put_opt<T: Into<Value> + Clone>(&mut self, key: &str, value: &Option<T>) {
        if let Some(v) = value {
            self.put(key, v.clone());
        }
    }

    fn put_obj(&mut self, key: &str, obj: Obj) {
        if !obj.is_empty() {
            self.put(key, obj.into_value());
        }
    }

    fn put_opt_obj(&mut self, key: &str, obj: Option<Obj>) {
        if let Some(obj) = obj {
            self.put_obj(key, obj);
        }
    }

    fn put_strings(&mut self, key: &str, items: &[String]) {
        if !items.is_empty() {
            self.put(
                key,
                Value::Sequence(items.iter().map(|s| Value::from(s.as_str())).collect()),
            );
        }
    }

    fn put_string_map(&mut self, key: &str, map: &BTreeMap<String, String>) {
        if !map.is_empty() {
            let mut m = Mapping::new();
            for (k, v) in map {
                m.insert(Value::from(k.as_str()), Value::from(v.as_str()));
            }
            self.put(key, Value::Mapping(m));
        }
    }

    fn put_list(&mut self, key: &str, items: Vec<Obj>) {
        let items: Vec<Value> = items
            .into_iter()
            .filter(|o| !o.is_empty())
            .map(Obj::into_value)
            .collect();
        if !items.is_empty() {
            self.put(key, Value::Sequence(items));
        }
    }

    fn into_value(self) -> Value {
        Value::Mapping(self.0)
    }
}

// ──────────────────────────────────────────────
// Metadata
// ──────────────────────────────────────────────

fn metadata(r: &ResourceRecord) -> Obj {
    let mut m = Obj::new();
    m.put("name", r.name.as_str());
    m.put_opt("namespace", &r.namespace);
    m.put_string_map("labels", &r.labels);
    m.put_string_map("annotations", &r.annotations);
    m
}

// ──────────────────────────────────────────────
// Gateway
// ──────────────────────────────────────────────

fn gateway(g: &GatewaySpec) -> Obj {
    let mut spec = Obj::new();
    spec.put_string_map("selector", &g.selector);
    spec.put_list("servers", g.servers.iter().map(server).collect());
    spec
}

fn server(s: &ServerSpec) -> Obj {
    let mut o = Obj::new();
    let mut port = Obj::new();
    port.put("number", s.port.number);
    port.put("protocol", s.port.protocol.as_str());
    port.put_opt("name", &s.port.name);
    o.put_obj("port", port);
    o.put_strings("hosts", &s.hosts);
    o.put_opt_obj("tls", s.tls.as_ref().map(tls));
    o
}

fn tls(t: &TlsOptions) -> Obj {
    let mut o = Obj::new();
    o.put_opt("httpsRedirect", &t.https_redirect);
    o.put("mode", t.mode.as_str());
    o.put_opt("serverCertificate", &t.server_certificate);
    o.put_opt("privateKey", &t.private_key);
    o.put_opt("caCertificates", &t.ca_certificates);
    o.put_strings("subjectAltNames", &t.subject_alt_names);
    o
}

// ──────────────────────────────────────────────
// VirtualService
// ──────────────────────────────────────────────

fn virtual_service(vs: &VirtualServiceSpec) -> Obj {
    let mut spec = Obj::new();
    spec.put_strings("hosts", &vs.hosts);
    spec.put_strings("gateways", &vs.gateways);
    spec.put_list("http", vs.http.iter().map(http_route).collect());
    spec
}

fn http_route(h: &HttpRoute) -> Obj {
    let mut o = Obj::new();
    o.put_list("match", h.matches.iter().map(match_request).collect());
    o.put_list("route", h.route.iter().map(destination_weight).collect());
    o.put_opt_obj(
        "redirect",
        h.redirect
            .as_ref()
            .map(|r| uri_authority(&r.uri, &r.authority)),
    );
    o.put_opt_obj(
        "rewrite",
        h.rewrite
            .as_ref()
            .map(|r| uri_authority(&r.uri, &r.authority)),
    );
    o.put_opt("timeout", &h.timeout);
    o.put_opt_obj("retries", h.retries.as_ref().map(retries));
    o.put_opt_obj("fault", h.fault.as_ref().map(fault));
    o.put_opt_obj("mirror", h.mirror.as_ref().map(destination));
    o.put_opt_obj("corsPolicy", h.cors_policy.as_ref().map(cors));
    o.put_string_map("appendHeaders", &h.append_headers);
    o
}

fn string_match(m: &StringMatch) -> Obj {
    let mut o = Obj::new();
    match m {
        StringMatch::Exact(s) => o.put("exact", s.as_str()),
        StringMatch::Prefix(s) => o.put("prefix", s.as_str()),
        StringMatch::Regex(s) => o.put("regex", s.as_str()),
    }
    o
}

fn match_request(m: &HttpMatchRequest) -> Obj {
    let mut o = Obj::new();
    o.put_opt_obj("uri", m.uri.as_ref().map(string_match));
    o.put_opt_obj("scheme", m.scheme.as_ref().map(string_match));
    o.put_opt_obj("method", m.method.as_ref().map(string_match));
    o.put_opt_obj("authority", m.authority.as_ref().map(string_match));
    if !m.headers.is_empty() {
        let mut headers = Obj::new();
        for (name, sm) in &m.headers {
            headers.put_obj(name, string_match(sm));
        }
        o.put_obj("headers", headers);
    }
    o.put_opt("port", &m.port);
    o
}

fn destination_weight(dw: &DestinationWeight) -> Obj {
    let mut o = Obj::new();
    o.put_obj("destination", destination(&dw.destination));
    o.put_opt("weight", &dw.weight);
    o
}

fn destination(d: &Destination) -> Obj {
    let mut o = Obj::new();
    o.put_opt("host", &d.host);
    o.put_opt("subset", &d.subset);
    if let Some(number) = d.port {
        let mut port = Obj::new();
        port.put("number", number);
        o.put_obj("port", port);
    }
    o
}

fn uri_authority(uri: &Option<String>, authority: &Option<String>) -> Obj {
    let mut o = Obj::new();
    o.put_opt("uri", uri);
    o.put_opt("authority", authority);
    o
}

fn retries(r: &HttpRetry) -> Obj {
    let mut o = Obj::new();
    o.put("attempts", r.attempts);
    o.put_opt("perTryTimeout", &r.per_try_timeout);
    o
}

fn fault(f: &FaultInjection) -> Obj {
    let mut o = Obj::new();
    if let Some(delay) = &f.delay {
        let mut d = Obj::new();
        d.put_opt("percent", &delay.percent);
        d.put("fixedDelay", delay.fixed_delay.as_str());
        o.put_obj("delay", d);
    }
    if let Some(abort) = &f.abort {
        let mut a = Obj::new();
        a.put_opt("percent", &abort.percent);
        a.put("httpStatus", abort.http_status);
        o.put_obj("abort", a);
    }
    o
}

fn cors(c: &CorsPolicy) -> Obj {
    let mut o = Obj::new();
    o.put_strings("allowOrigin", &c.allow_origin);
    o.put_strings("allowMethods", &c.allow_methods);
    o.put_strings("allowHeaders", &c.allow_headers);
    o.put_strings("exposeHeaders", &c.expose_headers);
    o.put_opt("maxAge", &c.max_age);
    o.put_opt("allowCredentials", &c.allow_credentials);
    o
}

// ──────────────────────────────────────────────
// Service / Deployment
// ──────────────────────────────────────────────

fn service(s: &ServiceSpec) -> Obj {
    let mut spec = Obj::new();
    spec.put_opt("type", &s.service_type);
    spec.put_string_map("selector", &s.selector);
    spec.put_list(
        "ports",
        s.ports
            .iter()
            .map(|p| {
                let mut o = Obj::new();
                o.put_opt("name", &p.name);
                o.put("port", p.port);
                o.put_opt("targetPort", &p.target_port);
                o.put_opt("protocol", &p.protocol);
                o
            })
            .collect(),
    );
    spec
}

fn deployment(d: &DeploymentSpec) -> Obj {
    let mut spec = Obj::new();
    spec.put_opt("replicas", &d.replicas);
    if !d.selector.is_empty() {
        let mut selector = Obj::new();
        selector.put_string_map("matchLabels", &d.selector);
        spec.put_obj("selector", selector);
    }
    let mut template = Obj::new();
    if !d.selector.is_empty() {
        let mut meta = Obj::new();
        meta.put_string_map("labels", &d.selector);
        template.put_obj("metadata", meta);
    }
    let mut pod = Obj::new();
    pod.put_list("containers", d.containers.iter().map(container).collect());
    template.put_obj("spec", pod);
    spec.put_obj("template", template);
    spec
}

fn container(c: &Container) -> Obj {
    let mut o = Obj::new();
    o.put("name", c.name.as_str());
    o.put("image", c.image.as_str());
    o.put_opt("imagePullPolicy", &c.image_pull_policy);
    o.put_strings("command", &c.command);
    o.put_strings("args", &c.args);
    o.put_list(
        "ports",
        c.ports
            .iter()
            .map(|p| {
                let mut po = Obj::new();
                po.put("containerPort", p.container_port);
                po.put_opt("name", &p.name);
                po.put_opt("protocol", &p.protocol);
                po
            })
            .collect(),
    );
    o.put_list(
        "env",
        c.env
            .iter()
            .map(|(k, v)| {
                let mut e = Obj::new();
                e.put("name", k.as_str());
                e.put("value", v.as_str());
                e
            })
            .collect(),
    );
    o
}

// ──────────────────────────────────────────────
// Route / BuildConfig
// ──────────────────────────────────────────────

fn route(r: &RouteSpec) -> Obj {
    let mut spec = Obj::new();
    spec.put_opt("host", &r.host);
    spec.put_opt("path", &r.path);
    if let Some(to) = &r.to {
        let mut t = Obj::new();
        t.put("kind", "Service");
        t.put_opt("name", &to.name);
        t.put_opt("weight", &to.weight);
        spec.put_obj("to", t);
    }
    if let Some(target) = &r.target_port {
        let mut port = Obj::new();
        match target {
            PortRef::Number(n) => port.put("targetPort", *n),
            PortRef::Name(s) => port.put("targetPort", s.as_str()),
        }
        spec.put_obj("port", port);
    }
    if let Some(tls) = &r.tls {
        let mut t = Obj::new();
        t.put("termination", tls.termination.as_str());
        t.put_opt("certificate", &tls.certificate);
        t.put_opt("key", &tls.key);
        t.put_opt("caCertificate", &tls.ca_certificate);
        t.put_opt(
            "insecureEdgeTerminationPolicy",
            &tls.insecure_edge_termination_policy,
        );
        spec.put_obj("tls", t);
    }
    spec
}

fn build_config(b: &BuildConfigSpec) -> Obj {
    let mut spec = Obj::new();
    if let Some(source) = &b.source {
        let mut s = Obj::new();
        s.put("type", "Git");
        let mut git = Obj::new();
        git.put("uri", source.git_uri.as_str());
        git.put_opt("ref", &source.git_ref);
        s.put_obj("git", git);
        s.put_opt("contextDir", &source.context_dir);
        spec.put_obj("source", s);
    }
    if let Some(strategy) = &b.strategy {
        let mut s = Obj::new();
        let mut detail = Obj::new();
        if let Some(from) = &strategy.from {
            let mut f = Obj::new();
            f.put("kind", "DockerImage");
            f.put("name", from.as_str());
            detail.put_obj("from", f);
        }
        let detail_key = match strategy.strategy_type {
            StrategyType::Docker => {
                detail.put_opt("dockerfilePath", &strategy.dockerfile_path);
                s.put("type", "Docker");
                "dockerStrategy"
            }
            StrategyType::Source => {
                s.put("type", "Source");
                "sourceStrategy"
            }
        };
        s.put_obj(detail_key, detail);
        spec.put_obj("strategy", s);
    }
    if let Some(output) = &b.output {
        let mut to = Obj::new();
        to.put("kind", "ImageStreamTag");
        to.put("name", output.as_str());
        let mut o = Obj::new();
        o.put_obj("to", to);
        spec.put_obj("output", o);
    }
    spec.put_list(
        "triggers",
        b.triggers
            .iter()
            .map(|t| {
                let mut o = Obj::new();
                o.put("type", t.as_str());
                o
            })
            .collect(),
    );
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass0_load::parse_declarations;
    use crate::pass1_extract::extract;
    use crate::pass2_registry::Registry;
    use crate::pass3_defaults::apply_defaults;
    use crate::pass4_resolve::resolve;
    use crate::pass5_validate::validate;

    fn validated(yaml: &str) -> Validated {
        let f = parse_declarations(yaml, "t.yaml").unwrap();
        let mut registry = Registry::new();
        let mut extracted = Vec::new();
        for d in &f.resources {
            let e = extract(d).unwrap();
            registry.register(e.record().id.clone(), e.record().clone());
            extracted.push(e);
        }
        let last = extracted.pop().unwrap();
        validate(resolve(apply_defaults(last, None), &registry).unwrap()).unwrap()
    }

    fn keys(v: &Value) -> Vec<String> {
        v.as_mapping()
            .unwrap()
            .keys()
            .map(|k| k.as_str().unwrap().to_owned())
            .collect()
    }

    const GATEWAY: &str = r#"
resources:
  - kind: Gateway
    name: gw1
    selector: { app: x }
    servers:
      - port: { number: 80, protocol: HTTP, name: http }
        hosts: ["*"]
"#;

    #[test]
    fn top_level_key_order_is_fixed() {
        let v = render_value(&validated(GATEWAY));
        assert_eq!(keys(&v), vec!["apiVersion", "kind", "metadata", "spec"]);
    }

    #[test]
    fn gateway_renders_expected_block_text() {
        let m = render(&validated(GATEWAY)).unwrap();
        assert_eq!(m.file_name, "gateway-gw1.yaml");
        assert_eq!(
            m.text,
            "apiVersion: networking.istio.io/v1alpha3\n\
             kind: Gateway\n\
             metadata:\n  name: gw1\n\
             spec:\n  selector:\n    app: x\n  servers:\n  - port:\n      number: 80\n      protocol: HTTP\n      name: http\n    hosts:\n    - '*'\n"
        );
        assert!(!m.text.contains("tls"));
        assert!(!m.text.contains('{'));
    }

    #[test]
    fn absent_fields_never_render() {
        let v = render_value(&validated(
            r#"
resources:
  - kind: VirtualService
    name: reviews
    http:
      - route:
          - destination: { host: reviews, port: -1 }
            weight: -1
"#,
        ));
        let route = &v["spec"]["http"][0]["route"][0];
        assert_eq!(keys(route), vec!["destination"]);
        assert_eq!(keys(&route["destination"]), vec!["host"]);
        assert_eq!(keys(&v["metadata"]), vec!["name"]);
    }

    #[test]
    fn present_weight_and_port_render() {
        let v = render_value(&validated(
            r#"
resources:
  - kind: VirtualService
    name: reviews
    hosts: [reviews]
    http:
      - route:
          - destination: { host: reviews, subset: v1, port: 9080 }
            weight: 0
"#,
        ));
        let route = &v["spec"]["http"][0]["route"][0];
        assert_eq!(route["weight"], Value::from(0));
        assert_eq!(route["destination"]["port"]["number"], Value::from(9080));
        assert_eq!(route["destination"]["subset"], Value::from("v1"));
    }

    #[test]
    fn service_reference_never_renders() {
        let m = render(&validated(
            r#"
resources:
  - kind: Service
    id: svcA
    ports: [{ port: 9080 }]
  - kind: VirtualService
    name: reviews
    http:
      - route: [{ destination: { serviceName: svcA } }]
"#,
        ))
        .unwrap();
        assert!(m.text.contains("host: svc-a"), "{}", m.text);
        assert!(!m.text.contains("serviceName"));
    }

    #[test]
    fn deployment_renders_pod_template() {
        let v = render_value(&validated(
            r#"
resources:
  - kind: Deployment
    name: reviews
    replicas: 2
    selector: { app: reviews }
    containers:
      - name: reviews
        image: example/reviews:1.0
        ports: [{ containerPort: 9080 }]
        env: { LOG_LEVEL: debug }
"#,
        ));
        assert_eq!(v["apiVersion"], Value::from("apps/v1"));
        assert_eq!(v["spec"]["selector"]["matchLabels"]["app"], Value::from("reviews"));
        let c = &v["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(c["ports"][0]["containerPort"], Value::from(9080));
        assert_eq!(c["env"][0]["name"], Value::from("LOG_LEVEL"));
        assert_eq!(c["env"][0]["value"], Value::from("debug"));
        assert!(c.get("command").is_none());
    }

    #[test]
    fn build_config_renders_strategy_detail() {
        let v = render_value(&validated(
            r#"
resources:
  - kind: BuildConfig
    name: app
    source: { git: { uri: "https://example.com/app.git", ref: main } }
    strategy: { type: Docker, dockerfilePath: Containerfile }
    output: { to: "app:latest" }
    triggers: [ConfigChange]
"#,
        ));
        assert_eq!(v["metadata"]["labels"]["app"], Value::from("app"));
        assert_eq!(v["spec"]["strategy"]["type"], Value::from("Docker"));
        assert_eq!(
            v["spec"]["strategy"]["dockerStrategy"]["dockerfilePath"],
            Value::from("Containerfile")
        );
        assert_eq!(v["spec"]["output"]["to"]["kind"], Value::from("ImageStreamTag"));
        assert_eq!(v["spec"]["triggers"][0]["type"], Value::from("ConfigChange"));
    }

    #[test]
    fn empty_strategy_detail_is_omitted() {
        let v = render_value(&validated(
            r#"
resources:
  - kind: BuildConfig
    name: app
    source: { git: { uri: "https://example.com/app.git" } }
    strategy: { type: Docker }
    output: { to: "app:latest" }
"#,
        ));
        assert_eq!(keys(&v["spec"]["strategy"]), vec!["type"]);
    }

    #[test]
    fn route_renders_service_target() {
        let v = render_value(&validated(
            r#"
resources:
  - kind: Route
    name: web
    host: web.example.com
    to: { name: web, weight: 100 }
    targetPort: 8080
    tls: { termination: edge, insecureEdgeTerminationPolicy: Redirect }
"#,
        ));
        assert_eq!(v["spec"]["to"]["kind"], Value::from("Service"));
        assert_eq!(v["spec"]["port"]["targetPort"], Value::from(8080));
        assert_eq!(v["spec"]["tls"]["termination"], Value::from("edge"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = render(&validated(GATEWAY)).unwrap();
        let b = render(&validated(GATEWAY)).unwrap();
        assert_eq!(a, b);
    }
}
