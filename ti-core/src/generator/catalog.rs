// Vocabularies the generator draws from. Names are fictional or public
// ATT&CK technique titles; nothing here describes a real incident.

#[derive(Debug, Clone, Copy)]
pub struct TechniqueMeta {
  pub id: &'static str,
  pub name: &'static str,
}

pub const TECHNIQUES: &[TechniqueMeta] = &[
  TechniqueMeta { id: "T1566", name: "Phishing" },
  TechniqueMeta { id: "T1059", name: "Command and Scripting Interpreter" },
  TechniqueMeta { id: "T1071", name: "Application Layer Protocol" },
  TechniqueMeta { id: "T1486", name: "Data Encrypted for Impact" },
  TechniqueMeta { id: "T1027", name: "Obfuscated Files or Information" },
  TechniqueMeta { id: "T1547", name: "Boot or Logon Autostart Execution" },
  TechniqueMeta { id: "T1555", name: "Credentials from Password Stores" },
  TechniqueMeta { id: "T1041", name: "Exfiltration Over C2 Channel" },
  TechniqueMeta { id: "T1190", name: "Exploit Public-Facing Application" },
  TechniqueMeta { id: "T1105", name: "Ingress Tool Transfer" },
];

pub const MALWARE_FAMILIES: &[&str] = &[
  "GlassViper",
  "NightLoom",
  "EmberDrop",
  "QuietMantis",
  "RustHook",
  "PaleCourier",
  "IronWisp",
  "HollowGate",
];

pub const MALWARE_TYPES: &[&str] = &[
  "backdoor",
  "dropper",
  "ransomware",
  "remote-access-trojan",
  "spyware",
  "trojan",
  "worm",
];

pub const THREAT_ACTORS: &[&str] = &[
  "Copper Heron",
  "Static Lynx",
  "Vanta Bloom",
  "Granite Owl",
  "Saffron Jackal",
  "Cinder Moth",
];

pub const THREAT_ACTOR_TYPES: &[&str] = &[
  "crime-syndicate",
  "hacker",
  "insider-disgruntled",
  "nation-state",
  "spy",
];

pub const INDICATOR_LABELS: &[&str] = &[
  "malicious-activity",
  "anomalous-activity",
  "attribution",
  "compromised",
  "benign",
];

pub const DOMAIN_WORDS: &[&str] = &[
  "update", "cdn", "secure", "login", "portal", "sync", "mail", "cloud", "files", "auth",
];

pub const TLDS: &[&str] = &["com", "net", "org", "io", "info", "biz", "xyz"];

pub const URL_PATHS: &[&str] = &[
  "gate.php",
  "download/setup.exe",
  "api/v2/beacon",
  "wp-content/uploads/inv.zip",
  "static/js/loader.js",
];

pub const SOFTWARE: &[&str] = &[
  "web gateway",
  "VPN appliance",
  "mail server",
  "file transfer service",
  "content management system",
];
