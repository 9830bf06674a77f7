//! 会员领域

use std::collections::HashMap;

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Basic,
    Vip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: u64,
    pub name: String,
    pub grade: Grade,
}

impl Member {
    pub fn new(id: u64, name: impl Into<String>, grade: Grade) -> Self {
        Self {
            id,
            name: name.into(),
            grade,
        }
    }
}

pub trait MemberRepository: Send + Sync {
    fn save(&self, member: Member);

    fn find_by_id(&self, id: u64) -> Option<Member>;
}

/// 内存会员存储，由容器持有唯一实例
#[derive(Debug, Default)]
pub struct MemoryMemberRepository {
    store: RwLock<HashMap<u64, Member>>,
}

impl MemoryMemberRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }
}

impl MemberRepository for MemoryMemberRepository {
    fn save(&self, member: Member) {
        tracing::debug!("Saving member {} ({})", member.id, member.name);
        self.store.write().insert(member.id, member);
    }

    fn find_by_id(&self, id: u64) -> Option<Member> {
        self.store.read().get(&id).cloned()
    }
}

pub trait MemberService: Send + Sync {
    fn join(&self, member: Member);

    fn find_member(&self, id: u64) -> anyhow::Result<Member>;
}

pub struct MemberServiceImpl {
    repository: std::sync::Arc<dyn MemberRepository>,
}

impl MemberServiceImpl {
    pub fn new(repository: std::sync::Arc<dyn MemberRepository>) -> Self {
        Self { repository }
    }
}

impl MemberService for MemberServiceImpl {
    fn join(&self, member: Member) {
        self.repository.save(member);
    }

    fn find_member(&self, id: u64) -> anyhow::Result<Member> {
        self.repository
            .find_by_id(id)
            .ok_or_else(|| anyhow::anyhow!("member {} not found", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_join_and_find() {
        let repository = Arc::new(MemoryMemberRepository::new());
        let service = MemberServiceImpl::new(Arc::clone(&repository) as Arc<dyn MemberRepository>);

        service.join(Member::new(1, "memberA", Grade::Vip));

        assert_eq!(service.find_member(1).unwrap().grade, Grade::Vip);
        assert!(service.find_member(2).is_err());
        assert_eq!(repository.len(), 1);
    }

    #[test]
    fn test_repositories_do_not_share_state() {
        let first = MemoryMemberRepository::new();
        let second = MemoryMemberRepository::new();
        first.save(Member::new(1, "memberA", Grade::Basic));
        assert!(second.is_empty());
    }
}
