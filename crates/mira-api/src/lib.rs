pub mod client;
pub mod error;
pub mod event;
pub mod types;

pub use client::{ClientBackend, ClientFactory, EventStream, RemoteClient};
pub use error::{Error, Result};
pub use event::{Event, EventEnvelope};
pub use types::{
    AgentInfo, CommandInfo, Config, FileDiff, LspStatus, McpStatus, Message, MessageTime,
    MessageWithParts, Part, PathInfo, Permission, Project, ProjectIcon, Provider, ProviderList,
    Pty, PtyCreate, PtySize, PtyUpdate, Question, Role, Session, SessionStatus, SessionTime,
    SessionUpdate, Todo, VcsInfo,
};
